//! Backtest integration tests
//!
//! Run the full calendar year 2021 over synthetic closes served by the
//! in-memory feed.

use carry_trader::backtest::{inverse_futures_pnl, BacktestError, BacktestRunner};
use carry_trader::config::BacktestConfig;
use carry_trader::data::{read_daily_records_csv, resolve_output_path, write_records, OutputFormat};
use carry_trader::feed::InMemoryFeed;
use carry_trader::rollover::RolloverSelector;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        out.push(day);
        day += Duration::days(1);
    }
    out
}

fn config(start: NaiveDate, end: NaiveDate) -> BacktestConfig {
    BacktestConfig {
        start_date: start,
        end_date: end,
        notional: dec!(1000000),
        contract_size: Some(dec!(100)),
        ..Default::default()
    }
}

/// Spot rises 100 USD a day; every contract trades at a 1% premium
fn trending_feed(start: NaiveDate, end: NaiveDate) -> InMemoryFeed {
    let spot = |i: usize| dec!(30000) + Decimal::from(i as u64) * dec!(100);
    let range = days(start, end);

    let selector = RolloverSelector::for_range("BTCUSD", 1, start, end).unwrap();
    let mut feed = InMemoryFeed::new()
        .with_closes("BTCUSDT", range.iter().enumerate().map(|(i, d)| (*d, spot(i))));
    for segment in selector.schedule(start, end).unwrap() {
        feed = feed.with_closes(
            segment.symbol,
            range.iter().enumerate().map(|(i, d)| (*d, spot(i) * dec!(1.01))),
        );
    }
    feed
}

#[tokio::test]
async fn test_full_year_with_rolls() {
    let (start, end) = (date(2021, 1, 1), date(2021, 12, 31));
    let feed = trending_feed(start, end);
    let mut runner = BacktestRunner::new(config(start, end)).unwrap();
    let report = runner.run_with_feed(&feed).await.unwrap();

    assert_eq!(report.records.len(), 365);
    assert!(report.records.windows(2).all(|w| w[0].date < w[1].date));
    assert_eq!(report.records[0].date, start);
    assert_eq!(report.records[364].date, end);

    let roll_days: Vec<NaiveDate> = report.records.iter().filter(|r| r.roll).map(|r| r.date).collect();
    assert_eq!(
        roll_days,
        vec![date(2021, 3, 25), date(2021, 6, 24), date(2021, 9, 23), date(2021, 12, 30)]
    );
    assert_eq!(report.summary.rolls, 4);

    let symbols: Vec<&str> = report
        .records
        .iter()
        .map(|r| r.active_future_symbol.as_str())
        .collect();
    assert_eq!(symbols[0], "BTCUSD_210326");
    assert_eq!(symbols[83], "BTCUSD_210625"); // 2021-03-25
    assert_eq!(symbols[364], "BTCUSD_220325");

    // Cumulative P&L is the running sum, never reset on roll days
    let mut running = Decimal::ZERO;
    for record in &report.records {
        running += record.daily_pnl();
        assert_eq!(record.cumulative_pnl, running);
    }
    assert_eq!(report.summary.total_pnl, running);
    assert_eq!(report.summary.days, 365);
}

#[tokio::test]
async fn test_first_step_matches_hand_calculation() {
    let (start, end) = (date(2021, 1, 1), date(2021, 1, 10));
    let feed = trending_feed(start, end);
    let mut runner = BacktestRunner::new(config(start, end)).unwrap();
    let report = runner.run_with_feed(&feed).await.unwrap();

    let entry = &report.records[0];
    assert_eq!(entry.future_contracts, dec!(-10000));
    assert_eq!(entry.daily_pnl(), dec!(0));

    let day2 = &report.records[1];
    assert_eq!(day2.spot_pnl, entry.spot_quantity * dec!(100));
    let btc = inverse_futures_pnl(dec!(-10000), dec!(100), dec!(30300), dec!(30401));
    assert_eq!(day2.futures_pnl, btc * dec!(30100));
    // Short hedge loses as the contract rallies
    assert!(day2.futures_pnl < dec!(0));
}

#[tokio::test]
async fn test_flat_market_accumulates_nothing() {
    let (start, end) = (date(2021, 3, 1), date(2021, 7, 31));
    let range = days(start, end);
    let selector = RolloverSelector::for_range("BTCUSD", 1, start, end).unwrap();
    let mut feed = InMemoryFeed::new().with_closes("BTCUSDT", range.iter().map(|d| (*d, dec!(45000))));
    for segment in selector.schedule(start, end).unwrap() {
        feed = feed.with_closes(segment.symbol, range.iter().map(|d| (*d, dec!(45500))));
    }

    let mut runner = BacktestRunner::new(config(start, end)).unwrap();
    let report = runner.run_with_feed(&feed).await.unwrap();
    assert_eq!(report.records.len(), range.len());
    assert!(report.records.iter().all(|r| r.cumulative_pnl == dec!(0)));
    assert_eq!(report.summary.max_drawdown, dec!(0));
    assert!(report.summary.sharpe_ratio.is_none());
}

#[tokio::test]
async fn test_missing_outgoing_close_on_roll_day() {
    let (start, end) = (date(2021, 3, 20), date(2021, 3, 31));
    let range = days(start, end);
    let feed = InMemoryFeed::new()
        .with_closes("BTCUSDT", range.iter().map(|d| (*d, dec!(50000))))
        .with_closes(
            "BTCUSD_210326",
            range.iter().filter(|d| **d < date(2021, 3, 25)).map(|d| (*d, dec!(50500))),
        )
        .with_closes("BTCUSD_210625", range.iter().map(|d| (*d, dec!(51000))));

    let mut runner = BacktestRunner::new(config(start, end)).unwrap();
    let err = runner.run_with_feed(&feed).await.unwrap_err();
    assert!(matches!(
        err,
        BacktestError::DataGap { ref symbol, date: d } if symbol == "BTCUSD_210326" && d == date(2021, 3, 25)
    ));
}

#[tokio::test]
async fn test_offline_klines_to_csv_output() {
    let data_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let range = days(date(2021, 1, 1), date(2021, 1, 31));

    for (symbol, base) in [("BTCUSDT", 29000i64), ("BTCUSD_210326", 29300i64)] {
        let mut file = std::fs::File::create(data_dir.path().join(format!("{}.csv", symbol))).unwrap();
        writeln!(file, "date,open,high,low,close").unwrap();
        for (i, day) in range.iter().enumerate() {
            let close = base + 50 * i as i64;
            writeln!(file, "{},{},{},{},{}", day, close, close + 10, close - 10, close).unwrap();
        }
    }

    let mut cfg = config(date(2021, 1, 1), date(2021, 1, 31));
    cfg.data_dir = Some(data_dir.path().to_path_buf());
    cfg.output_path = out_dir.path().to_path_buf();

    let feed = InMemoryFeed::from_kline_dir(data_dir.path()).unwrap();
    let mut runner = BacktestRunner::new(cfg.clone()).unwrap();
    let report = runner.run_with_feed(&feed).await.unwrap();
    assert_eq!(report.records.len(), 31);

    let path = resolve_output_path(
        &cfg.output_path,
        &cfg.future_pair,
        cfg.start_date,
        cfg.end_date,
        cfg.output_format,
    );
    assert!(path.ends_with("backtest_BTCUSD_20210101_20210131.csv"));
    write_records(&path, &report.records, OutputFormat::Csv).unwrap();

    let written = read_daily_records_csv(&path).unwrap();
    assert_eq!(written.len(), 31);
    assert_eq!(written[30].date, date(2021, 1, 31));
    assert_eq!(written[30].active_future_symbol, "BTCUSD_210326");
}

#[test]
fn test_invalid_range_rejected() {
    let err = BacktestRunner::new(config(date(2021, 12, 31), date(2021, 1, 1))).unwrap_err();
    assert!(matches!(err, BacktestError::InvalidConfig(_)));
}
