//! Risk management types

use rust_decimal::Decimal;
use thiserror::Error;

/// Sizing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizingError {
    /// Reference price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),
    /// Requested amount must not be negative
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
}
