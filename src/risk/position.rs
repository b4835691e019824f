//! Hedged spot/future position

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Relative hedge mismatch tolerated by default
pub const DEFAULT_HEDGE_TOLERANCE: Decimal = dec!(0.01);

/// Long spot + short coin-margined future
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Spot quantity held (BTC)
    pub spot_quantity: Decimal,
    /// Currently held future contract, if any
    pub future_symbol: Option<String>,
    /// Signed contract count (negative = short)
    pub future_contracts: Decimal,
    /// Price at which the current future leg was entered or last rebased
    pub entry_price: Decimal,
}

impl Position {
    /// Empty position
    pub fn flat() -> Self {
        Self::default()
    }

    /// Whether both legs are empty
    pub fn is_flat(&self) -> bool {
        self.spot_quantity.is_zero() && self.future_contracts.is_zero()
    }

    /// USD notional of the spot leg
    pub fn spot_notional(&self, spot_price: Decimal) -> Decimal {
        self.spot_quantity * spot_price
    }

    /// USD notional of the future leg (absolute)
    pub fn hedge_notional(&self, face_value: Decimal) -> Decimal {
        (self.future_contracts * face_value).abs()
    }

    /// Future notional over spot notional
    pub fn hedge_ratio(&self, spot_price: Decimal, face_value: Decimal) -> Option<Decimal> {
        let spot = self.spot_notional(spot_price);
        if spot.is_zero() {
            return None;
        }
        Some(self.hedge_notional(face_value) / spot)
    }

    /// Whether the legs offset within `tolerance` (relative) plus one contract
    pub fn is_hedged(&self, spot_price: Decimal, face_value: Decimal, tolerance: Decimal) -> bool {
        let spot = self.spot_notional(spot_price);
        let hedge = self.hedge_notional(face_value);
        (spot - hedge).abs() <= spot * tolerance + face_value
    }

    /// Replace the future leg (roll or initial entry)
    pub fn rebase_future(&mut self, symbol: impl Into<String>, contracts: Decimal, entry_price: Decimal) {
        self.future_symbol = Some(symbol.into());
        self.future_contracts = contracts;
        self.entry_price = entry_price;
    }
}
