//! End-to-end integration tests

use carry_trader::backtest::BacktestRunner;
use carry_trader::config::{Config, ExecutionMode};
use carry_trader::data::OutputFormat;
use carry_trader::execution::{create_gateway, OrderPort};
use carry_trader::telemetry::LogFormat;
use rust_decimal_macros::dec;

const EXAMPLE: &str = include_str!("../../config.toml.example");

#[test]
fn test_config_example_loads() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();

    assert_eq!(config.execution.mode, ExecutionMode::Paper);
    assert_eq!(config.execution.spot_symbol, "BTCUSDT");
    assert_eq!(config.execution.notional_usdt, dec!(1000000));
    assert_eq!(config.execution.num_slices(), 288);
    assert!(config.execution.dry_run);
    assert_eq!(config.backtest.contract_size, Some(dec!(100)));
    assert_eq!(config.backtest.output_format, OutputFormat::Csv);
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_example_has_no_credentials() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();
    assert!(config.exchange.api_key.is_none());
    assert!(config.exchange.api_secret.is_none());
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, EXAMPLE).unwrap();

    let config = Config::load(&path).unwrap();
    let printed = toml::to_string_pretty(&config).unwrap();
    let reparsed: Config = toml::from_str(&printed).unwrap();
    assert_eq!(reparsed.backtest.start_date, config.backtest.start_date);
    assert_eq!(reparsed.execution.price_offset_bps, dec!(10));
}

#[test]
fn test_paper_gateway_from_config() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();
    let gateway = create_gateway(&config).unwrap();
    assert_eq!(gateway.name(), "paper");
}

#[test]
fn test_backtest_runner_from_example() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();
    let runner = BacktestRunner::new(config.backtest).unwrap();
    let segments = runner.schedule().unwrap();

    let symbols: Vec<&str> = segments.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(
        symbols,
        vec![
            "BTCUSD_210326",
            "BTCUSD_210625",
            "BTCUSD_210924",
            "BTCUSD_211231",
            "BTCUSD_220325"
        ]
    );
}
