//! In-memory market data
//!
//! Serves quotes, klines and instrument rules from memory. Klines can be
//! loaded from `date,open,high,low,close` CSV files for offline backtests.

use super::{DeliveryContract, Kline, MarketDataPort, Quote};
use crate::instrument::InstrumentSpec;
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;

/// Market data held in memory
#[derive(Default)]
pub struct InMemoryFeed {
    quotes: RwLock<HashMap<String, Quote>>,
    klines: HashMap<String, Vec<Kline>>,
    instruments: HashMap<String, InstrumentSpec>,
    contracts: Vec<DeliveryContract>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a quote
    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quotes.get_mut().insert(quote.symbol.clone(), quote);
        self
    }

    /// Add daily candles for a symbol (sorted and de-duplicated by date)
    pub fn with_klines(mut self, symbol: impl Into<String>, mut klines: Vec<Kline>) -> Self {
        klines.sort_by_key(|k| k.date);
        klines.dedup_by_key(|k| k.date);
        self.klines.insert(symbol.into(), klines);
        self
    }

    /// Add daily closes for a symbol as flat candles
    pub fn with_closes(
        self,
        symbol: impl Into<String>,
        closes: impl IntoIterator<Item = (NaiveDate, Decimal)>,
    ) -> Self {
        let klines = closes
            .into_iter()
            .map(|(date, close)| Kline {
                date,
                open: close,
                high: close,
                low: close,
                close,
            })
            .collect();
        self.with_klines(symbol, klines)
    }

    pub fn with_instrument(mut self, spec: InstrumentSpec) -> Self {
        self.instruments.insert(spec.symbol.clone(), spec);
        self
    }

    pub fn with_contract(mut self, contract: DeliveryContract) -> Self {
        self.contracts.push(contract);
        self
    }

    /// Replace a quote while the feed is shared
    pub async fn set_quote(&self, quote: Quote) {
        self.quotes.write().await.insert(quote.symbol.clone(), quote);
    }

    /// Load klines for `symbol` from a CSV file with a
    /// `date,open,high,low,close` header
    pub fn load_klines_csv(self, symbol: impl Into<String>, path: &Path) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open kline file {}", path.display()))?;

        let mut klines = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let field = |i: usize| -> anyhow::Result<&str> {
                record
                    .get(i)
                    .map(str::trim)
                    .ok_or_else(|| anyhow::anyhow!("{}:{} missing column {}", path.display(), line + 2, i))
            };
            let price = |i: usize| -> anyhow::Result<Decimal> {
                let raw = field(i)?;
                Decimal::from_str(raw)
                    .with_context(|| format!("{}:{} invalid price {:?}", path.display(), line + 2, raw))
            };

            klines.push(Kline {
                date: NaiveDate::parse_from_str(field(0)?, "%Y-%m-%d")
                    .with_context(|| format!("{}:{} invalid date", path.display(), line + 2))?,
                open: price(1)?,
                high: price(2)?,
                low: price(3)?,
                close: price(4)?,
            });
        }

        Ok(self.with_klines(symbol, klines))
    }

    /// Load every `<SYMBOL>.csv` in a directory
    pub fn from_kline_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut feed = Self::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read kline directory {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(symbol) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            feed = feed.load_klines_csv(symbol, &path)?;
        }

        tracing::info!(dir = ?dir, symbols = feed.klines.len(), "Loaded offline klines");
        Ok(feed)
    }
}

#[async_trait]
impl MarketDataPort for InMemoryFeed {
    async fn get_quote(&self, symbol: &str) -> anyhow::Result<Quote> {
        self.quotes
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No quote for {}", symbol))
    }

    async fn get_daily_klines(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Kline>> {
        Ok(self
            .klines
            .get(symbol)
            .map(|all| {
                all.iter()
                    .filter(|k| k.date >= start && k.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_instrument(&self, symbol: &str) -> anyhow::Result<InstrumentSpec> {
        self.instruments
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No instrument spec for {}", symbol))
    }

    async fn delivery_contracts(&self, pair: &str) -> anyhow::Result<Vec<DeliveryContract>> {
        Ok(self
            .contracts
            .iter()
            .filter(|c| c.pair == pair)
            .cloned()
            .collect())
    }
}
