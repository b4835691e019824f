//! Position sizing
//!
//! Converts USD notional into instrument quantity: BTC units for spot,
//! whole contracts for coin-margined futures. Quantities are always rounded
//! down to the lot step, and anything under the exchange minimums is
//! reported as dust instead of being sent as an unfillable order.

use rust_decimal::Decimal;

use super::SizingError;
use crate::instrument::{round_down_to_step, InstrumentSpec};

/// Result of sizing an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// Quantity that satisfies the instrument's lot and notional rules
    Quantity(Decimal),
    /// Rounded quantity falls under the minimum quantity or notional
    DustBelowMinimum {
        /// Quantity after lot rounding
        quantity: Decimal,
        /// Implied USD notional of that quantity
        notional: Decimal,
    },
}

impl Sizing {
    /// Quantity to trade (zero for dust)
    pub fn quantity(&self) -> Decimal {
        match self {
            Sizing::Quantity(q) => *q,
            Sizing::DustBelowMinimum { .. } => Decimal::ZERO,
        }
    }

    /// Whether the order was suppressed as dust
    pub fn is_dust(&self) -> bool {
        matches!(self, Sizing::DustBelowMinimum { .. })
    }
}

/// Size a USD amount for `spec` at `price`
///
/// Spot quantity is `usd_amount / price`; inverse futures use
/// `usd_amount / face_value` since each contract is a fixed USD amount.
pub fn size(
    usd_amount: Decimal,
    price: Decimal,
    spec: &InstrumentSpec,
) -> Result<Sizing, SizingError> {
    if usd_amount < Decimal::ZERO {
        return Err(SizingError::InvalidAmount(usd_amount));
    }
    if price <= Decimal::ZERO {
        return Err(SizingError::InvalidPrice(price));
    }
    let raw = spec.quantity_for(usd_amount, price);
    Ok(apply_lot_rules(raw, price, spec))
}

/// Apply lot rounding and the dust rule to a quantity target
pub fn round_quantity(
    quantity: Decimal,
    price: Decimal,
    spec: &InstrumentSpec,
) -> Result<Sizing, SizingError> {
    if quantity < Decimal::ZERO {
        return Err(SizingError::InvalidAmount(quantity));
    }
    if price <= Decimal::ZERO {
        return Err(SizingError::InvalidPrice(price));
    }
    Ok(apply_lot_rules(quantity, price, spec))
}

fn apply_lot_rules(raw: Decimal, price: Decimal, spec: &InstrumentSpec) -> Sizing {
    if raw.is_zero() {
        return Sizing::Quantity(Decimal::ZERO);
    }

    let quantity = round_down_to_step(raw, spec.step_size);
    let notional = spec.notional(quantity, price);

    if quantity.is_zero() || quantity < spec.min_qty || notional < spec.min_notional {
        return Sizing::DustBelowMinimum { quantity, notional };
    }

    Sizing::Quantity(quantity)
}
