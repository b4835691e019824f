//! Backtest analytics and reporting

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::DailyRecord;
use crate::risk::DrawdownMonitor;

const DAYS_PER_YEAR: u32 = 365;

/// Summary statistics from a backtest
#[derive(Debug, Clone, Default, Serialize)]
pub struct BacktestSummary {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Number of daily records
    pub days: usize,
    /// Cumulative P&L on the last day
    pub total_pnl: Decimal,
    /// Total P&L over the starting notional
    pub total_return: Decimal,
    /// `total_return × 365 / elapsed_days`
    pub annualized_return: Decimal,
    /// Population stdev of daily returns × √365
    pub annualized_volatility: f64,
    pub sharpe_ratio: Option<f64>,
    /// Maximum drawdown of notional + cumulative P&L (absolute)
    pub max_drawdown: Decimal,
    /// Maximum drawdown (fraction of peak equity)
    pub max_drawdown_pct: Decimal,
    /// Fraction of days after entry with positive P&L
    pub win_rate: Decimal,
    pub winning_days: usize,
    /// Contract rolls inside the window
    pub rolls: usize,
}

/// Accumulates summary statistics one record at a time
#[derive(Debug, Clone)]
pub struct SummaryTracker {
    notional: Decimal,
    drawdown: DrawdownMonitor,
    returns: Vec<f64>,
    first: Option<NaiveDate>,
    last: Option<NaiveDate>,
    days: usize,
    total_pnl: Decimal,
    winning_days: usize,
    rolls: usize,
}

impl SummaryTracker {
    pub fn new(notional: Decimal) -> Self {
        Self {
            notional,
            drawdown: DrawdownMonitor::new(notional),
            returns: Vec::new(),
            first: None,
            last: None,
            days: 0,
            total_pnl: Decimal::ZERO,
            winning_days: 0,
            rolls: 0,
        }
    }

    pub fn record(&mut self, record: &DailyRecord) {
        if self.first.is_none() {
            self.first = Some(record.date);
        } else {
            // Entry day carries no P&L and is left out of the return series
            let pnl = record.daily_pnl();
            if pnl > Decimal::ZERO {
                self.winning_days += 1;
            }
            if !self.notional.is_zero() {
                self.returns
                    .push((pnl / self.notional).to_f64().unwrap_or_default());
            }
        }
        if record.roll {
            self.rolls += 1;
        }
        self.last = Some(record.date);
        self.days += 1;
        self.total_pnl = record.cumulative_pnl;
        self.drawdown.update(self.notional + record.cumulative_pnl);
    }

    /// Current drawdown of notional + cumulative P&L
    pub fn current_drawdown(&self) -> Decimal {
        self.drawdown.current_drawdown()
    }

    pub fn finish(&self) -> BacktestSummary {
        let total_return = if self.notional.is_zero() {
            Decimal::ZERO
        } else {
            self.total_pnl / self.notional
        };

        let elapsed_days = match (self.first, self.last) {
            (Some(first), Some(last)) => (last - first).num_days(),
            _ => 0,
        };
        let annualized_return = if elapsed_days > 0 {
            total_return * Decimal::from(DAYS_PER_YEAR) / Decimal::from(elapsed_days)
        } else {
            Decimal::ZERO
        };

        let annualized_volatility =
            population_stdev(&self.returns) * f64::from(DAYS_PER_YEAR).sqrt();
        let sharpe_ratio = (annualized_volatility > 0.0)
            .then(|| annualized_return.to_f64().unwrap_or_default() / annualized_volatility);

        let scored_days = self.days.saturating_sub(1);
        let win_rate = if scored_days > 0 {
            Decimal::from(self.winning_days as u64) / Decimal::from(scored_days as u64)
        } else {
            Decimal::ZERO
        };

        BacktestSummary {
            start_date: self.first,
            end_date: self.last,
            days: self.days,
            total_pnl: self.total_pnl,
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            max_drawdown: self.drawdown.max_drawdown,
            max_drawdown_pct: self.drawdown.max_drawdown_pct,
            win_rate,
            winning_days: self.winning_days,
            rolls: self.rolls,
        }
    }
}

fn population_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

impl BacktestSummary {
    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        let date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        let sharpe = self
            .sharpe_ratio
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "n/a".into());

        format!(
            r#"
══════════════════════════════════════════════════════
               BACKTEST RESULTS
══════════════════════════════════════════════════════

PERIOD
───────────────────────────────────────────────────────
Start:            {}
End:              {}
Days:             {}
Rolls:            {}

PERFORMANCE
───────────────────────────────────────────────────────
Total P&L:        {:+.2}
Total Return:     {:+.2}%
Annualized:       {:+.2}%
Volatility:       {:.2}%
Sharpe Ratio:     {}
Max Drawdown:     {:.2} ({:.2}%)
Win Rate:         {:.1}% ({} days)
══════════════════════════════════════════════════════
"#,
            date(self.start_date),
            date(self.end_date),
            self.days,
            self.rolls,
            self.total_pnl,
            self.total_return * dec!(100),
            self.annualized_return * dec!(100),
            self.annualized_volatility * 100.0,
            sharpe,
            self.max_drawdown,
            self.max_drawdown_pct * dec!(100),
            self.win_rate * dec!(100),
            self.winning_days,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day: u32, daily: Decimal, cumulative: Decimal, roll: bool) -> DailyRecord {
        DailyRecord {
            date: NaiveDate::from_ymd_opt(2021, 1, day).unwrap(),
            spot_price: dec!(30000),
            futures_price: dec!(30300),
            spot_pnl: daily,
            futures_pnl: dec!(0),
            cumulative_pnl: cumulative,
            active_future_symbol: "BTCUSD_210326".into(),
            spot_quantity: dec!(1),
            future_contracts: dec!(-300),
            roll,
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = SummaryTracker::new(dec!(1000000)).finish();
        assert_eq!(summary.days, 0);
        assert_eq!(summary.annualized_return, dec!(0));
        assert!(summary.sharpe_ratio.is_none());
        assert!(summary.format_table().contains("n/a"));
    }

    #[test]
    fn test_summary_statistics() {
        let mut tracker = SummaryTracker::new(dec!(1000));
        tracker.record(&record(1, dec!(0), dec!(0), false));
        tracker.record(&record(2, dec!(10), dec!(10), false));
        tracker.record(&record(3, dec!(-5), dec!(5), true));
        tracker.record(&record(4, dec!(15), dec!(20), false));
        let summary = tracker.finish();

        assert_eq!(summary.days, 4);
        assert_eq!(summary.total_pnl, dec!(20));
        assert_eq!(summary.total_return, dec!(0.02));
        // 0.02 × 365 / 3
        assert_eq!(summary.annualized_return, dec!(0.02) * dec!(365) / dec!(3));
        assert_eq!(summary.winning_days, 2);
        assert_eq!(summary.win_rate, dec!(2) / dec!(3));
        assert_eq!(summary.rolls, 1);
        // Peak 1010, trough 1005
        assert_eq!(summary.max_drawdown, dec!(5));
        assert!(summary.annualized_volatility > 0.0);
        assert!(summary.sharpe_ratio.unwrap() > 0.0);
    }

    #[test]
    fn test_flat_series_has_no_sharpe() {
        let mut tracker = SummaryTracker::new(dec!(1000));
        for day in 1..=5 {
            tracker.record(&record(day, dec!(0), dec!(0), false));
        }
        let summary = tracker.finish();
        assert_eq!(summary.annualized_volatility, 0.0);
        assert!(summary.sharpe_ratio.is_none());
        assert_eq!(summary.win_rate, dec!(0));
        assert_eq!(summary.max_drawdown, dec!(0));
    }

    #[test]
    fn test_population_stdev() {
        let stdev = population_stdev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((stdev - 2.0).abs() < 1e-12);
        assert_eq!(population_stdev(&[1.0]), 0.0);
    }
}
