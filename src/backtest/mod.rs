//! Backtesting module
//!
//! Replays daily closes through the rollover calendar and the inverse
//! futures P&L engine

mod analytics;
mod history;
mod pnl;
mod runner;

pub use analytics::{BacktestSummary, SummaryTracker};
pub use history::PriceHistory;
pub use pnl::{inverse_futures_pnl, DailyRecord, PnLEngine};
pub use runner::{BacktestReport, BacktestRunner, DEFAULT_CONTRACT_SIZE};

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::InvalidConfig;
use crate::risk::SizingError;
use crate::rollover::RollCalendarError;

/// Errors that abort a backtest run
#[derive(Debug, Error)]
pub enum BacktestError {
    /// No close for a symbol on a day inside the window
    #[error("No {symbol} close for {date}")]
    DataGap { symbol: String, date: NaiveDate },

    #[error(transparent)]
    RollCalendar(#[from] RollCalendarError),

    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfig),

    #[error("Sizing failed: {0}")]
    Sizing(#[from] SizingError),

    /// Market data source failure
    #[error("Price source failed: {0}")]
    Source(#[source] anyhow::Error),
}
