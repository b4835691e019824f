//! Quarterly contract rollover
//!
//! Selects the active delivery contract for a date and flags roll days

mod calendar;

pub use calendar::{
    contract_symbol, last_friday, parse_contract_symbol, quarterly_expiries, ActiveContract,
    ContractSegment, RollEvent, RolloverSelector, DEFAULT_ROLL_BUFFER_DAYS, QUARTER_MONTHS,
};

use chrono::NaiveDate;
use thiserror::Error;

/// Roll calendar errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RollCalendarError {
    /// No known quarterly contract expires after the cutoff
    #[error("No quarterly contract expires after {after} (calendar ends {horizon:?})")]
    NoContractAfter {
        after: NaiveDate,
        horizon: Option<NaiveDate>,
    },
    /// Start date after end date
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}
