//! Historical daily closes for the backtest window

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::BacktestError;
use crate::feed::{Kline, MarketDataPort};
use crate::rollover::ContractSegment;

/// Daily closes keyed by date, for the spot pair and each contract
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    spot_symbol: String,
    spot: BTreeMap<NaiveDate, Decimal>,
    futures: HashMap<String, BTreeMap<NaiveDate, Decimal>>,
}

fn closes(klines: Vec<Kline>) -> BTreeMap<NaiveDate, Decimal> {
    klines.into_iter().map(|k| (k.date, k.close)).collect()
}

impl PriceHistory {
    pub fn new(spot_symbol: impl Into<String>) -> Self {
        Self {
            spot_symbol: spot_symbol.into(),
            ..Default::default()
        }
    }

    /// Add spot closes
    pub fn with_spot(mut self, closes: impl IntoIterator<Item = (NaiveDate, Decimal)>) -> Self {
        self.spot.extend(closes);
        self
    }

    /// Add closes for a futures contract
    pub fn with_future(
        mut self,
        symbol: impl Into<String>,
        closes: impl IntoIterator<Item = (NaiveDate, Decimal)>,
    ) -> Self {
        self.futures.entry(symbol.into()).or_default().extend(closes);
        self
    }

    /// Download spot closes for `[start, end]` and each contract's closes
    /// over the days it is held
    pub async fn load(
        feed: &dyn MarketDataPort,
        spot_symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        segments: &[ContractSegment],
    ) -> Result<Self, BacktestError> {
        let spot = feed
            .get_daily_klines(spot_symbol, start, end)
            .await
            .map_err(BacktestError::Source)?;
        tracing::info!(symbol = spot_symbol, days = spot.len(), "Loaded spot closes");

        let mut history = Self::new(spot_symbol).with_spot(closes(spot).into_iter());
        for segment in segments {
            let klines = feed
                .get_daily_klines(&segment.symbol, segment.first_day, segment.last_day)
                .await
                .map_err(BacktestError::Source)?;
            tracing::info!(
                symbol = %segment.symbol,
                from = %segment.first_day,
                to = %segment.last_day,
                days = klines.len(),
                "Loaded contract closes"
            );
            history = history.with_future(&segment.symbol, closes(klines).into_iter());
        }
        Ok(history)
    }

    pub fn spot_symbol(&self) -> &str {
        &self.spot_symbol
    }

    /// Spot close on `date`
    pub fn spot_close(&self, date: NaiveDate) -> Result<Decimal, BacktestError> {
        self.spot.get(&date).copied().ok_or_else(|| BacktestError::DataGap {
            symbol: self.spot_symbol.clone(),
            date,
        })
    }

    /// Close of `symbol` on `date`
    pub fn future_close(&self, symbol: &str, date: NaiveDate) -> Result<Decimal, BacktestError> {
        self.futures
            .get(symbol)
            .and_then(|series| series.get(&date))
            .copied()
            .ok_or_else(|| BacktestError::DataGap {
                symbol: symbol.to_string(),
                date,
            })
    }

    /// Contracts with loaded closes
    pub fn contracts(&self) -> impl Iterator<Item = &str> {
        self.futures.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::InMemoryFeed;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_missing_days_are_data_gaps() {
        let history = PriceHistory::new("BTCUSDT")
            .with_spot(vec![(date(2021, 1, 1), dec!(29000))])
            .with_future("BTCUSD_210326", vec![(date(2021, 1, 1), dec!(29500))]);

        assert_eq!(history.spot_close(date(2021, 1, 1)).unwrap(), dec!(29000));
        assert!(matches!(
            history.spot_close(date(2021, 1, 2)),
            Err(BacktestError::DataGap { ref symbol, .. }) if symbol == "BTCUSDT"
        ));
        assert!(matches!(
            history.future_close("BTCUSD_210625", date(2021, 1, 1)),
            Err(BacktestError::DataGap { ref symbol, .. }) if symbol == "BTCUSD_210625"
        ));
    }

    #[tokio::test]
    async fn test_load_restricts_contracts_to_segments() {
        let days = |from: u32, to: u32| -> Vec<(NaiveDate, Decimal)> {
            (from..=to).map(|d| (date(2021, 3, d), dec!(50000))).collect()
        };
        let feed = InMemoryFeed::new()
            .with_closes("BTCUSDT", days(1, 31))
            .with_closes("BTCUSD_210326", days(1, 26))
            .with_closes("BTCUSD_210625", days(1, 31));

        let segments = vec![
            ContractSegment {
                symbol: "BTCUSD_210326".into(),
                expiry: date(2021, 3, 26),
                first_day: date(2021, 3, 20),
                last_day: date(2021, 3, 25),
            },
            ContractSegment {
                symbol: "BTCUSD_210625".into(),
                expiry: date(2021, 6, 25),
                first_day: date(2021, 3, 25),
                last_day: date(2021, 3, 31),
            },
        ];

        let history = PriceHistory::load(&feed, "BTCUSDT", date(2021, 3, 20), date(2021, 3, 31), &segments)
            .await
            .unwrap();

        assert!(history.future_close("BTCUSD_210326", date(2021, 3, 25)).is_ok());
        assert!(history.future_close("BTCUSD_210326", date(2021, 3, 26)).is_err());
        assert!(history.future_close("BTCUSD_210625", date(2021, 3, 24)).is_err());
        assert!(history.spot_close(date(2021, 3, 19)).is_err());
        assert_eq!(history.contracts().count(), 2);
    }
}
