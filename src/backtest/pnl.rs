//! Daily spot and inverse-futures P&L
//!
//! The spot leg earns `quantity × Δclose`. The short coin-margined leg
//! earns `contracts × face × (1/reference − 1/close)` BTC per day, converted
//! to USD at the day's spot close. On a roll day the outgoing contract is
//! settled at its close and the hedge is re-sized on the incoming contract.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::BacktestError;
use crate::config::InvalidConfig;
use crate::instrument::InstrumentSpec;
use crate::risk::{size, Position, Sizing};
use crate::rollover::RollEvent;

/// Tick size assumed for historical contract prices
const FUTURE_TICK: Decimal = dec!(0.1);

/// BTC P&L of `contracts` (signed) inverse contracts moving from
/// `reference` to `close`
pub fn inverse_futures_pnl(
    contracts: Decimal,
    face_value: Decimal,
    reference: Decimal,
    close: Decimal,
) -> Decimal {
    if reference.is_zero() || close.is_zero() {
        return Decimal::ZERO;
    }
    contracts * face_value * (Decimal::ONE / reference - Decimal::ONE / close)
}

/// One backtest day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub spot_price: Decimal,
    /// Close of the contract held at the end of the day
    pub futures_price: Decimal,
    pub spot_pnl: Decimal,
    /// USD P&L of the futures leg (realized against settlement on roll days)
    pub futures_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    pub active_future_symbol: String,
    pub spot_quantity: Decimal,
    /// Signed contract count held at the end of the day
    pub future_contracts: Decimal,
    pub roll: bool,
}

impl DailyRecord {
    /// Spot plus futures P&L for the day
    pub fn daily_pnl(&self) -> Decimal {
        self.spot_pnl + self.futures_pnl
    }
}

/// Position and running P&L state across days
#[derive(Debug, Clone)]
pub struct PnLEngine {
    face_value: Decimal,
    position: Position,
    prev_spot: Decimal,
    reference_future: Decimal,
    cumulative: Decimal,
}

impl PnLEngine {
    pub fn new(face_value: Decimal) -> Self {
        Self {
            face_value,
            position: Position::flat(),
            prev_spot: Decimal::ZERO,
            reference_future: Decimal::ZERO,
            cumulative: Decimal::ZERO,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn cumulative_pnl(&self) -> Decimal {
        self.cumulative
    }

    fn hedge_contracts(&self, symbol: &str, notional: Decimal, future_close: Decimal) -> Result<Decimal, BacktestError> {
        let spec = InstrumentSpec::inverse_future(symbol, self.face_value, FUTURE_TICK);
        match size(notional, future_close, &spec)? {
            Sizing::Quantity(contracts) => Ok(-contracts),
            Sizing::DustBelowMinimum { notional, .. } => Err(InvalidConfig(format!(
                "hedge notional {} is below one {} USD contract",
                notional.round_dp(2),
                self.face_value
            ))
            .into()),
        }
    }

    /// Enter both legs at the day's closes; no P&L on the entry day
    pub fn open(
        &mut self,
        date: NaiveDate,
        notional: Decimal,
        spot_close: Decimal,
        symbol: &str,
        future_close: Decimal,
    ) -> Result<DailyRecord, BacktestError> {
        if spot_close <= Decimal::ZERO {
            return Err(crate::risk::SizingError::InvalidPrice(spot_close).into());
        }
        let contracts = self.hedge_contracts(symbol, notional, future_close)?;
        self.position.spot_quantity = notional / spot_close;
        self.position.rebase_future(symbol, contracts, future_close);
        self.prev_spot = spot_close;
        self.reference_future = future_close;

        Ok(self.record(date, spot_close, future_close, Decimal::ZERO, Decimal::ZERO, false))
    }

    /// Mark both legs to the day's closes on the same contract
    pub fn step(&mut self, date: NaiveDate, spot_close: Decimal, future_close: Decimal) -> DailyRecord {
        let spot_pnl = self.position.spot_quantity * (spot_close - self.prev_spot);
        let btc = inverse_futures_pnl(
            self.position.future_contracts,
            self.face_value,
            self.reference_future,
            future_close,
        );
        let futures_pnl = btc * spot_close;

        self.prev_spot = spot_close;
        self.reference_future = future_close;
        self.record(date, spot_close, future_close, spot_pnl, futures_pnl, false)
    }

    /// Settle the outgoing contract and re-hedge on the incoming one
    ///
    /// `event.settlement_price` must carry the outgoing contract's close.
    pub fn roll(
        &mut self,
        date: NaiveDate,
        event: &RollEvent,
        spot_close: Decimal,
        incoming_close: Decimal,
    ) -> Result<DailyRecord, BacktestError> {
        let settlement = event.settlement_price.ok_or_else(|| BacktestError::DataGap {
            symbol: event.outgoing_symbol.clone(),
            date,
        })?;

        let spot_pnl = self.position.spot_quantity * (spot_close - self.prev_spot);
        let btc = inverse_futures_pnl(
            self.position.future_contracts,
            self.face_value,
            self.reference_future,
            settlement,
        );
        let futures_pnl = btc * spot_close;

        let spot_notional = self.position.spot_notional(spot_close);
        let contracts = self.hedge_contracts(&event.incoming_symbol, spot_notional, incoming_close)?;
        self.position
            .rebase_future(&event.incoming_symbol, contracts, incoming_close);
        self.prev_spot = spot_close;
        self.reference_future = incoming_close;

        Ok(self.record(date, spot_close, incoming_close, spot_pnl, futures_pnl, true))
    }

    fn record(
        &mut self,
        date: NaiveDate,
        spot_close: Decimal,
        future_close: Decimal,
        spot_pnl: Decimal,
        futures_pnl: Decimal,
        roll: bool,
    ) -> DailyRecord {
        self.cumulative += spot_pnl + futures_pnl;
        DailyRecord {
            date,
            spot_price: spot_close,
            futures_price: future_close,
            spot_pnl,
            futures_pnl,
            cumulative_pnl: self.cumulative,
            active_future_symbol: self.position.future_symbol.clone().unwrap_or_default(),
            spot_quantity: self.position.spot_quantity,
            future_contracts: self.position.future_contracts,
            roll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_short_loses_when_price_rises() {
        // -1 × 100 × (1/50000 − 1/55000) = −0.000181818... BTC
        let btc = inverse_futures_pnl(dec!(-1), dec!(100), dec!(50000), dec!(55000));
        assert!(btc < dec!(0));
        assert!((btc - dec!(-0.000181818)).abs() < dec!(0.000000001));
    }

    #[test]
    fn test_unchanged_price_is_exactly_zero() {
        let btc = inverse_futures_pnl(dec!(-250), dec!(100), dec!(43210.7), dec!(43210.7));
        assert_eq!(btc, dec!(0));
    }

    #[test]
    fn test_open_sizes_both_legs() {
        let mut engine = PnLEngine::new(dec!(100));
        let record = engine
            .open(date(2021, 1, 1), dec!(1000000), dec!(29000), "BTCUSD_210326", dec!(29500))
            .unwrap();

        assert_eq!(record.spot_pnl, dec!(0));
        assert_eq!(record.futures_pnl, dec!(0));
        assert_eq!(record.future_contracts, dec!(-10000));
        assert_eq!(record.active_future_symbol, "BTCUSD_210326");
        assert_eq!(engine.position().entry_price, dec!(29500));
        assert!(!record.roll);
    }

    #[test]
    fn test_step_combines_legs() {
        let mut engine = PnLEngine::new(dec!(100));
        engine
            .open(date(2021, 1, 1), dec!(50000), dec!(50000), "BTCUSD_210326", dec!(50000))
            .unwrap();
        let record = engine.step(date(2021, 1, 2), dec!(55000), dec!(55000));

        // 1 BTC spot gains 5000; 500 short contracts lose 500×100×(1/50000−1/55000) BTC
        assert_eq!(record.spot_pnl, dec!(5000));
        let expected_futures = dec!(-500) * dec!(100) * (dec!(1) / dec!(50000) - dec!(1) / dec!(55000)) * dec!(55000);
        assert_eq!(record.futures_pnl, expected_futures);
        assert!((record.futures_pnl - dec!(-5000)).abs() < dec!(0.0001));
        assert_eq!(record.cumulative_pnl, record.spot_pnl + record.futures_pnl);
    }

    #[test]
    fn test_flat_prices_accumulate_nothing() {
        let mut engine = PnLEngine::new(dec!(100));
        engine
            .open(date(2021, 1, 1), dec!(1000000), dec!(30000), "BTCUSD_210326", dec!(30300))
            .unwrap();
        for day in 2..=20 {
            let record = engine.step(date(2021, 1, day), dec!(30000), dec!(30300));
            assert_eq!(record.cumulative_pnl, dec!(0));
        }
    }

    #[test]
    fn test_roll_realizes_and_rehedges() {
        let mut engine = PnLEngine::new(dec!(100));
        engine
            .open(date(2021, 3, 20), dec!(50000), dec!(50000), "BTCUSD_210326", dec!(50000))
            .unwrap();
        let before = engine.cumulative_pnl();

        let event = RollEvent {
            date: date(2021, 3, 25),
            outgoing_symbol: "BTCUSD_210326".into(),
            outgoing_expiry: date(2021, 3, 26),
            incoming_symbol: "BTCUSD_210625".into(),
            incoming_expiry: date(2021, 6, 25),
            settlement_price: None,
        }
        .with_settlement(dec!(50000));

        let record = engine
            .roll(date(2021, 3, 25), &event, dec!(60000), dec!(61000))
            .unwrap();

        // Outgoing settled unchanged: only spot moved
        assert_eq!(record.futures_pnl, dec!(0));
        assert_eq!(record.spot_pnl, dec!(10000));
        assert!(record.roll);
        assert_eq!(record.active_future_symbol, "BTCUSD_210625");
        assert_eq!(record.futures_price, dec!(61000));
        // Spot now worth 60000 USD → 600 contracts
        assert_eq!(record.future_contracts, dec!(-600));
        assert_eq!(engine.position().entry_price, dec!(61000));
        assert_eq!(record.cumulative_pnl, before + dec!(10000));

        // Next day references the incoming close
        let next = engine.step(date(2021, 3, 26), dec!(60000), dec!(61000));
        assert_eq!(next.futures_pnl, dec!(0));
    }

    #[test]
    fn test_roll_without_settlement_is_data_gap() {
        let mut engine = PnLEngine::new(dec!(100));
        engine
            .open(date(2021, 3, 20), dec!(50000), dec!(50000), "BTCUSD_210326", dec!(50000))
            .unwrap();
        let event = RollEvent {
            date: date(2021, 3, 25),
            outgoing_symbol: "BTCUSD_210326".into(),
            outgoing_expiry: date(2021, 3, 26),
            incoming_symbol: "BTCUSD_210625".into(),
            incoming_expiry: date(2021, 6, 25),
            settlement_price: None,
        };
        let err = engine
            .roll(date(2021, 3, 25), &event, dec!(50000), dec!(50000))
            .unwrap_err();
        assert!(matches!(err, BacktestError::DataGap { .. }));
    }

    #[test]
    fn test_notional_below_one_contract_rejected() {
        let mut engine = PnLEngine::new(dec!(100));
        let err = engine
            .open(date(2021, 1, 1), dec!(50), dec!(30000), "BTCUSD_210326", dec!(30000))
            .unwrap_err();
        assert!(matches!(err, BacktestError::InvalidConfig(_)));
    }
}
