//! Risk management module
//!
//! Position sizing, hedge tracking, and drawdown

mod drawdown;
mod position;
mod sizing;
mod types;

pub use drawdown::DrawdownMonitor;
pub use position::{Position, DEFAULT_HEDGE_TOLERANCE};
pub use sizing::{round_quantity, size, Sizing};
pub use types::SizingError;
