//! CLI interface for carry-trader
//!
//! Provides subcommands for:
//! - `open`: TWAP into long spot / short future
//! - `close`: TWAP out of an existing spread
//! - `backtest`: Replay the carry position over history
//! - `calendar`: Show quarterly expiries and roll days
//! - `config`: Show the effective configuration

mod backtest;
mod calendar;
mod execute;

pub use backtest::BacktestArgs;
pub use calendar::CalendarArgs;
pub use execute::{CloseArgs, ExecutionOverrides, OpenArgs};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "carry-trader")]
#[command(about = "Cash-and-carry execution and backtesting for BTC spot vs quarterly futures")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the spread over the execution window
    Open(OpenArgs),
    /// Unwind a spread over the execution window
    Close(CloseArgs),
    /// Run a historical backtest
    Backtest(BacktestArgs),
    /// Print quarterly expiries and roll days
    Calendar(CalendarArgs),
    /// Print the effective configuration
    Config,
}
