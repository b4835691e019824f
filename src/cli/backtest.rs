//! Backtest command implementation

use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::backtest::{BacktestReport, BacktestRunner};
use crate::config::{BacktestConfig, Config};
use crate::data::{resolve_output_path, write_records, OutputFormat};
use crate::feed::{BinanceFeed, InMemoryFeed, MarketDataPort};

#[derive(Args, Debug)]
pub struct BacktestArgs {
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// USD notional per leg
    #[arg(long)]
    pub notional: Option<Decimal>,

    /// Output file, or directory for the default file name
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Directory of `<SYMBOL>.csv` daily klines to use instead of Binance
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

impl BacktestArgs {
    /// Backtest settings with command-line overrides applied
    pub fn effective(&self, config: &BacktestConfig) -> BacktestConfig {
        let mut config = config.clone();
        if let Some(start) = self.start {
            config.start_date = start;
        }
        if let Some(end) = self.end {
            config.end_date = end;
        }
        if let Some(notional) = self.notional {
            config.notional = notional;
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        config
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let backtest = self.effective(&config.backtest);
        let mut runner = BacktestRunner::new(backtest.clone())?;

        let feed: Box<dyn MarketDataPort> = match &backtest.data_dir {
            Some(dir) => Box::new(InMemoryFeed::from_kline_dir(dir)?),
            None => Box::new(BinanceFeed::with_config(config.exchange.binance())?),
        };

        let report = runner.run_with_feed(feed.as_ref()).await?;
        self.report(&backtest, &report)
    }

    fn report(&self, backtest: &BacktestConfig, report: &BacktestReport) -> anyhow::Result<()> {
        println!("{}", report.summary.format_table());

        let path = resolve_output_path(
            &backtest.output_path,
            &backtest.future_pair,
            backtest.start_date,
            backtest.end_date,
            backtest.output_format,
        );
        write_records(&path, &report.records, backtest.output_format)?;
        println!("Daily records written to {}", path.display());
        Ok(())
    }
}
