//! Open and close command implementations

use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::{Config, ExecutionConfig};
use crate::execution::{create_gateway, CancelHandle, OrderPort, SpreadExecutor, SpreadOutcome};
use crate::feed::{BinanceFeed, MarketDataPort};

/// Settings shared by `open` and `close`
#[derive(Args, Debug, Clone, Default)]
pub struct ExecutionOverrides {
    /// Execution window in hours
    #[arg(long)]
    pub hours: Option<Decimal>,

    /// Minutes between slices (fractional allowed)
    #[arg(long)]
    pub interval: Option<Decimal>,

    /// Use limit orders with a price cushion instead of market orders
    #[arg(long)]
    pub limit: bool,

    /// Submit orders (default is a dry run)
    #[arg(long)]
    pub execute: bool,

    /// Futures contract to trade instead of the front quarter
    #[arg(long)]
    pub future_symbol: Option<String>,
}

impl ExecutionOverrides {
    pub fn apply(&self, config: &mut ExecutionConfig) {
        if let Some(hours) = self.hours {
            config.duration_hours = hours;
        }
        if let Some(interval) = self.interval {
            config.slice_interval_minutes = interval;
        }
        if self.limit {
            config.use_market_orders = false;
        }
        if self.execute {
            config.dry_run = false;
        }
        if let Some(symbol) = &self.future_symbol {
            config.future_symbol = Some(symbol.clone());
        }
    }
}

#[derive(Args, Debug)]
pub struct OpenArgs {
    /// USD notional per leg
    #[arg(long)]
    pub notional: Option<Decimal>,

    #[command(flatten)]
    pub overrides: ExecutionOverrides,
}

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Spot BTC to sell
    #[arg(long)]
    pub spot_qty: Decimal,

    /// Futures contracts to buy back
    #[arg(long)]
    pub contracts: Decimal,

    #[command(flatten)]
    pub overrides: ExecutionOverrides,
}

async fn connect(config: &Config) -> anyhow::Result<SpreadExecutor> {
    let feed: Arc<dyn MarketDataPort> = Arc::new(BinanceFeed::with_config(config.exchange.binance())?);
    connect_with(config, feed).await
}

/// Only `[execution]` is checked; backtest settings do not gate trading
async fn connect_with(config: &Config, feed: Arc<dyn MarketDataPort>) -> anyhow::Result<SpreadExecutor> {
    config.execution.validate()?;
    let gateway = create_gateway(config)?;
    tracing::info!(
        gateway = gateway.name(),
        dry_run = config.execution.dry_run,
        "Order gateway ready"
    );
    Ok(SpreadExecutor::connect(config.execution.clone(), feed, gateway).await?)
}

/// Cancel the run on Ctrl-C; the current slice finishes first
fn cancel_on_ctrl_c() -> CancelHandle {
    let cancel = CancelHandle::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, aborting after the current slice");
            handle.cancel();
        }
    });
    cancel
}

fn print_outcome(outcome: &SpreadOutcome) {
    println!("{}", outcome.report.format_table());
    let position = &outcome.position;
    println!(
        "Position: {} BTC spot, {} {} contracts",
        position.spot_quantity.round_dp(8),
        position.future_contracts,
        position.future_symbol.as_deref().unwrap_or("-")
    );
}

impl OpenArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if let Some(notional) = self.notional {
            config.execution.notional_usdt = notional;
        }
        self.overrides.apply(&mut config.execution);

        let executor = connect(&config).await?;
        let outcome = executor.open(cancel_on_ctrl_c()).await?;
        print_outcome(&outcome);
        Ok(())
    }
}

impl CloseArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        self.overrides.apply(&mut config.execution);

        let executor = connect(&config).await?;
        let outcome = executor
            .close(self.spot_qty, self.contracts, cancel_on_ctrl_c())
            .await?;
        print_outcome(&outcome);
        Ok(())
    }
}
