//! Instrument specifications for spot pairs and coin-margined futures

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Instrument asset class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Spot pair quoted in USD(T), quantity in base units
    Spot,
    /// Coin-margined future with a fixed USD face value per contract
    InverseFuture,
}

/// Exchange trading rules for a single symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Exchange symbol (e.g., "BTCUSDT", "BTCUSD_240628")
    pub symbol: String,
    /// Asset class
    pub asset_class: AssetClass,
    /// USD per contract for futures, 1 for spot
    pub face_value: Decimal,
    /// Minimum order quantity
    pub min_qty: Decimal,
    /// Quantity increment
    pub step_size: Decimal,
    /// Minimum order notional in USD
    pub min_notional: Decimal,
    /// Price increment
    pub tick_size: Decimal,
}

impl InstrumentSpec {
    /// Spot instrument
    pub fn spot(
        symbol: impl Into<String>,
        step_size: Decimal,
        min_qty: Decimal,
        min_notional: Decimal,
        tick_size: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::Spot,
            face_value: Decimal::ONE,
            min_qty,
            step_size,
            min_notional,
            tick_size,
        }
    }

    /// Coin-margined future traded in whole contracts
    ///
    /// The minimum notional is one contract's face value.
    pub fn inverse_future(symbol: impl Into<String>, face_value: Decimal, tick_size: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::InverseFuture,
            face_value,
            min_qty: Decimal::ONE,
            step_size: Decimal::ONE,
            min_notional: face_value,
            tick_size,
        }
    }

    /// Whether this is a spot instrument
    pub fn is_spot(&self) -> bool {
        self.asset_class == AssetClass::Spot
    }

    /// USD notional of `quantity` at `price`
    pub fn notional(&self, quantity: Decimal, price: Decimal) -> Decimal {
        match self.asset_class {
            AssetClass::Spot => quantity * price,
            AssetClass::InverseFuture => quantity * self.face_value,
        }
    }

    /// Instrument quantity equivalent to a USD notional at `price`
    ///
    /// Returns zero when the divisor is not positive.
    pub fn quantity_for(&self, notional: Decimal, price: Decimal) -> Decimal {
        let divisor = match self.asset_class {
            AssetClass::Spot => price,
            AssetClass::InverseFuture => self.face_value,
        };
        if divisor <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        notional / divisor
    }

    /// Round a price down to the tick size
    pub fn round_price(&self, price: Decimal) -> Decimal {
        round_down_to_step(price, self.tick_size)
    }
}

/// Round `value` down to a multiple of `step`
///
/// A non-positive step leaves the value untouched.
pub fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).floor() * step).normalize()
}
