//! Market data types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::execution::Side;

/// Best bid/ask snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Best bid price
    pub bid: Decimal,
    /// Best ask price
    pub ask: Decimal,
    /// Local timestamp when the quote was received
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, bid: Decimal, ask: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            bid,
            ask,
            timestamp: Utc::now(),
        }
    }

    /// Price a taker on `side` would trade against (ask for buys, bid for sells)
    pub fn price_for(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }

    /// Whether both sides are usable
    pub fn is_valid(&self) -> bool {
        self.bid > Decimal::ZERO && self.ask > Decimal::ZERO && self.bid <= self.ask
    }
}

/// One daily OHLC candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    /// UTC day the candle opened
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// A listed coin-margined delivery contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryContract {
    /// Contract symbol (e.g., "BTCUSD_240628")
    pub symbol: String,
    /// Symbol family (e.g., "BTCUSD")
    pub pair: String,
    /// Delivery timestamp
    pub delivery: DateTime<Utc>,
    /// USD face value per contract
    pub contract_size: Decimal,
    /// Whether the contract is currently trading
    pub trading: bool,
}
