//! Market data module
//!
//! Quotes, daily klines and instrument rules for spot and coin-margined
//! futures, from Binance REST or from memory

mod binance;
mod memory;
mod types;

pub use binance::{BinanceConfig, BinanceFeed, COIN_M_API_URL, SPOT_API_URL};
pub use memory::InMemoryFeed;
pub use types::{DeliveryContract, Kline, Quote};

use crate::instrument::InstrumentSpec;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Trait for market data sources
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Current best bid/ask
    async fn get_quote(&self, symbol: &str) -> anyhow::Result<Quote>;
    /// Daily candles for `[start, end]`, ascending by date, no duplicates
    async fn get_daily_klines(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Kline>>;
    /// Trading rules for a symbol
    async fn get_instrument(&self, symbol: &str) -> anyhow::Result<InstrumentSpec>;
    /// Delivery contracts listed for a pair
    async fn delivery_contracts(&self, pair: &str) -> anyhow::Result<Vec<DeliveryContract>>;
}

/// Whether a symbol trades on the coin-margined futures venue
///
/// Delivery and perpetual contracts carry an underscore suffix
/// (`BTCUSD_240628`, `BTCUSD_PERP`); spot pairs never do.
pub fn is_coin_margined(symbol: &str) -> bool {
    symbol.contains('_')
}
