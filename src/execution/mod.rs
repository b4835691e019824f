//! Execution module
//!
//! Order gateways (paper and live), the TWAP plan and scheduler, and the
//! spread executor that drives both legs of the hedge

mod live;
mod paper;
mod plan;
mod scheduler;
mod spread;
mod types;

pub use live::{map_status, sign, BinanceOrderGateway};
pub use paper::{SimulatedGateway, DEFAULT_FILL_PROBABILITY};
pub use plan::{
    limit_price, split_evenly, Allotment, ExecutionPlan, LegFill, LegPlan, LegStatus, OrderStyle,
    Slice, SliceStatus,
};
pub use scheduler::{CancelHandle, ExecutionReport, ExecutionScheduler, LegSummary, RunState};
pub use spread::{select_front_contract, SpreadExecutor, SpreadOutcome};
pub use types::{OrderId, OrderOutcome, OrderRequest, OrderStatus, OrderType, Side};

use crate::config::{Config, ExecutionMode, InvalidConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Trait for order gateway implementations
#[async_trait]
pub trait OrderPort: Send + Sync {
    /// Submit an order and report its outcome
    async fn place_order(&self, order: OrderRequest) -> anyhow::Result<OrderOutcome>;
    /// Short gateway name for logs
    fn name(&self) -> &'static str;
}

/// Execution errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfig),
    /// One leg of one slice could not be executed; the run continues
    #[error("slice {slice} {symbol} failed: {reason}")]
    SliceSubmissionFailure {
        slice: usize,
        symbol: String,
        reason: String,
    },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("execution run already started")]
    AlreadyStarted,
    #[error(transparent)]
    Port(#[from] anyhow::Error),
}

/// Build the order gateway selected by `execution.mode`
pub fn create_gateway(config: &Config) -> anyhow::Result<Arc<dyn OrderPort>> {
    match config.execution.mode {
        ExecutionMode::Paper => {
            let probability = config.execution.fill_probability;
            let gateway = match config.execution.seed {
                Some(seed) => SimulatedGateway::seeded(probability, seed),
                None => SimulatedGateway::new(probability),
            };
            Ok(Arc::new(gateway))
        }
        ExecutionMode::Live => {
            let credentials = config.exchange.credentials().ok_or_else(|| {
                anyhow::anyhow!(
                    "live mode requires {} and {} (or exchange.api_key / exchange.api_secret)",
                    crate::config::API_KEY_ENV,
                    crate::config::API_SECRET_ENV
                )
            })?;
            Ok(Arc::new(BinanceOrderGateway::new(
                config.exchange.binance(),
                credentials,
                config.exchange.recv_window_ms,
            )?))
        }
    }
}
