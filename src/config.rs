//! Configuration types for carry-trader

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::data::OutputFormat;
use crate::feed::BinanceConfig;
use crate::telemetry::LogFormat;

/// Environment variable overriding `exchange.api_key`
pub const API_KEY_ENV: &str = "CARRY_API_KEY";
/// Environment variable overriding `exchange.api_secret`
pub const API_SECRET_ENV: &str = "CARRY_API_SECRET";

/// Widest limit cushion accepted, in basis points
pub const MAX_PRICE_OFFSET_BPS: Decimal = dec!(10);

/// Configuration rejected before any network or file I/O
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfig(pub String);

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Exchange endpoints and credentials
#[derive(Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_spot_url")]
    pub spot_base_url: String,
    #[serde(default = "default_futures_url")]
    pub futures_base_url: String,
    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Signed request validity window (milliseconds)
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_secret: Option<String>,
}

fn default_spot_url() -> String {
    crate::feed::SPOT_API_URL.to_string()
}
fn default_futures_url() -> String {
    crate::feed::COIN_M_API_URL.to_string()
}
fn default_request_timeout() -> u64 {
    10
}
fn default_recv_window() -> u64 {
    5000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            spot_base_url: default_spot_url(),
            futures_base_url: default_futures_url(),
            request_timeout_secs: default_request_timeout(),
            recv_window_ms: default_recv_window(),
            api_key: None,
            api_secret: None,
        }
    }
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("spot_base_url", &self.spot_base_url)
            .field("futures_base_url", &self.futures_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("recv_window_ms", &self.recv_window_ms)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// API key pair for signed endpoints
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl ExchangeConfig {
    /// Credentials from the environment, falling back to the config file
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    /// Credentials resolved through a custom variable lookup
    pub fn credentials_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
        let api_key = lookup(API_KEY_ENV)
            .or_else(|| self.api_key.clone())
            .filter(|k| !k.is_empty())?;
        let api_secret = lookup(API_SECRET_ENV)
            .or_else(|| self.api_secret.clone())
            .filter(|s| !s.is_empty())?;
        Some(Credentials {
            api_key,
            api_secret,
        })
    }

    /// REST client settings for market data
    pub fn binance(&self) -> BinanceConfig {
        BinanceConfig {
            spot_base_url: self.spot_base_url.clone(),
            futures_base_url: self.futures_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Order gateway selection
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Simulated fills
    #[default]
    Paper,
    /// Signed orders on Binance
    Live,
}

/// TWAP execution configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Spot leg symbol
    #[serde(default = "default_spot_symbol")]
    pub spot_symbol: String,

    /// Coin-margined pair used for front-contract discovery
    #[serde(default = "default_future_pair")]
    pub future_pair: String,

    /// Explicit futures contract; discovered from the pair when unset
    #[serde(default)]
    pub future_symbol: Option<String>,

    /// USD notional per leg when opening
    #[serde(default = "default_notional_usdt")]
    pub notional_usdt: Decimal,

    /// Execution window (hours)
    #[serde(default = "default_duration_hours")]
    pub duration_hours: Decimal,

    /// Spacing between slices (minutes, fractional allowed)
    #[serde(default = "default_slice_interval")]
    pub slice_interval_minutes: Decimal,

    /// Market orders instead of cushioned limits
    #[serde(default = "default_true")]
    pub use_market_orders: bool,

    /// Log orders without submitting or waiting
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Limit price cushion (basis points, capped at 10)
    #[serde(default = "default_price_offset_bps")]
    pub price_offset_bps: Decimal,

    /// Timeout for each quote or order call (seconds)
    #[serde(default = "default_order_timeout")]
    pub order_timeout_secs: u64,

    /// Simulated gateway fill probability
    #[serde(default = "default_fill_probability")]
    pub fill_probability: f64,

    /// Simulated gateway RNG seed
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_true() -> bool {
    true
}
fn default_spot_symbol() -> String {
    "BTCUSDT".to_string()
}
fn default_future_pair() -> String {
    "BTCUSD".to_string()
}
fn default_notional_usdt() -> Decimal {
    Decimal::new(1_000_000, 0)
}
fn default_duration_hours() -> Decimal {
    Decimal::new(24, 0)
}
fn default_slice_interval() -> Decimal {
    Decimal::new(5, 0)
}
fn default_price_offset_bps() -> Decimal {
    Decimal::new(10, 0)
}
fn default_order_timeout() -> u64 {
    10
}
fn default_fill_probability() -> f64 {
    0.9
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            spot_symbol: default_spot_symbol(),
            future_pair: default_future_pair(),
            future_symbol: None,
            notional_usdt: default_notional_usdt(),
            duration_hours: default_duration_hours(),
            slice_interval_minutes: default_slice_interval(),
            use_market_orders: true,
            dry_run: true,
            price_offset_bps: default_price_offset_bps(),
            order_timeout_secs: default_order_timeout(),
            fill_probability: default_fill_probability(),
            seed: None,
        }
    }
}

impl ExecutionConfig {
    /// `floor(duration / interval)`, at least one
    pub fn num_slices(&self) -> usize {
        if self.slice_interval_minutes <= Decimal::ZERO {
            return 1;
        }
        let minutes = self.duration_hours * Decimal::from(60);
        minutes
            .checked_div(self.slice_interval_minutes)
            .unwrap_or(Decimal::ZERO)
            .floor()
            .to_usize()
            .unwrap_or(0)
            .max(1)
    }

    /// Slice spacing, millisecond resolution
    pub fn slice_interval(&self) -> Duration {
        let millis = (self.slice_interval_minutes * Decimal::from(60_000))
            .round()
            .to_u64()
            .unwrap_or(0);
        Duration::from_millis(millis)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }

    /// Reject unusable settings
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.notional_usdt <= Decimal::ZERO {
            return Err(InvalidConfig(format!(
                "notional_usdt must be positive, got {}",
                self.notional_usdt
            )));
        }
        if self.duration_hours <= Decimal::ZERO {
            return Err(InvalidConfig(format!(
                "duration_hours must be positive, got {}",
                self.duration_hours
            )));
        }
        if self.slice_interval_minutes <= Decimal::ZERO || self.slice_interval().is_zero() {
            return Err(InvalidConfig(format!(
                "slice_interval_minutes must be positive, got {}",
                self.slice_interval_minutes
            )));
        }
        if self.price_offset_bps < Decimal::ZERO || self.price_offset_bps > MAX_PRICE_OFFSET_BPS {
            return Err(InvalidConfig(format!(
                "price_offset_bps must be within 0..={}, got {}",
                MAX_PRICE_OFFSET_BPS, self.price_offset_bps
            )));
        }
        if self.order_timeout_secs == 0 {
            return Err(InvalidConfig("order_timeout_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.fill_probability) {
            return Err(InvalidConfig(format!(
                "fill_probability must be within 0..=1, got {}",
                self.fill_probability
            )));
        }
        if self.spot_symbol.is_empty() || self.future_pair.is_empty() {
            return Err(InvalidConfig("spot_symbol and future_pair are required".into()));
        }
        Ok(())
    }
}

/// Historical backtest configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BacktestConfig {
    /// First day (inclusive)
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,

    /// Last day (inclusive)
    #[serde(default = "default_end_date")]
    pub end_date: NaiveDate,

    /// USD notional per leg
    #[serde(default = "default_backtest_notional")]
    pub notional: Decimal,

    /// Days before expiry to roll
    #[serde(default = "default_roll_buffer")]
    pub roll_buffer_days: u32,

    #[serde(default = "default_spot_symbol")]
    pub spot_symbol: String,

    #[serde(default = "default_future_pair")]
    pub future_pair: String,

    /// USD face value per contract; detected from exchange info when unset
    #[serde(default)]
    pub contract_size: Option<Decimal>,

    /// Output file, or directory for the default file name
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    #[serde(default)]
    pub output_format: OutputFormat,

    /// Directory of `<SYMBOL>.csv` klines; prices come from Binance when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default()
}
fn default_end_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 12, 31).unwrap_or_default()
}
fn default_backtest_notional() -> Decimal {
    Decimal::new(1_000_000, 0)
}
fn default_roll_buffer() -> u32 {
    crate::rollover::DEFAULT_ROLL_BUFFER_DAYS
}
fn default_output_path() -> PathBuf {
    PathBuf::from(".")
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            end_date: default_end_date(),
            notional: default_backtest_notional(),
            roll_buffer_days: default_roll_buffer(),
            spot_symbol: default_spot_symbol(),
            future_pair: default_future_pair(),
            contract_size: None,
            output_path: default_output_path(),
            output_format: OutputFormat::default(),
            data_dir: None,
        }
    }
}

impl BacktestConfig {
    /// Reject unusable settings
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.start_date > self.end_date {
            return Err(InvalidConfig(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.notional <= Decimal::ZERO {
            return Err(InvalidConfig(format!(
                "notional must be positive, got {}",
                self.notional
            )));
        }
        if let Some(size) = self.contract_size {
            if size <= Decimal::ZERO {
                return Err(InvalidConfig(format!(
                    "contract_size must be positive, got {}",
                    size
                )));
            }
        }
        if self.spot_symbol.is_empty() || self.future_pair.is_empty() {
            return Err(InvalidConfig("spot_symbol and future_pair are required".into()));
        }
        Ok(())
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.execution.validate()?;
        self.backtest.validate()
    }
}
