//! carry-trader: cash-and-carry BTC execution and backtesting
//!
//! This library provides the core components for:
//! - Spot and coin-margined futures market data from Binance
//! - Lot-size aware position sizing
//! - TWAP execution of the long spot / short future spread
//! - Paper and live order gateways
//! - Quarterly contract rollover calendar
//! - Daily inverse-futures P&L backtests
//! - CSV and Parquet output
//! - Structured logging and Prometheus metrics

pub mod backtest;
pub mod cli;
pub mod config;
pub mod data;
pub mod execution;
pub mod feed;
pub mod instrument;
pub mod risk;
pub mod rollover;
pub mod telemetry;
