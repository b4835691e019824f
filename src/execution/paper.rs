//! Simulated order gateway

use super::{OrderOutcome, OrderPort, OrderRequest, OrderStatus};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Fill probability used when none is configured
pub const DEFAULT_FILL_PROBABILITY: f64 = 0.9;

/// Paper gateway: each order fills completely with a fixed probability,
/// otherwise it is canceled. Price, quantity and side play no part.
pub struct SimulatedGateway {
    fill_probability: f64,
    rng: Mutex<StdRng>,
    orders: Arc<RwLock<Vec<(OrderRequest, OrderOutcome)>>>,
}

impl SimulatedGateway {
    /// Create a gateway seeded from system entropy
    pub fn new(fill_probability: f64) -> Self {
        Self::with_rng(fill_probability, StdRng::from_entropy())
    }

    /// Create a deterministic gateway
    pub fn seeded(fill_probability: f64, seed: u64) -> Self {
        Self::with_rng(fill_probability, StdRng::seed_from_u64(seed))
    }

    fn with_rng(fill_probability: f64, rng: StdRng) -> Self {
        Self {
            fill_probability: fill_probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
            orders: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Every order received so far with its outcome
    pub async fn orders(&self) -> Vec<(OrderRequest, OrderOutcome)> {
        self.orders.read().await.clone()
    }

    fn roll(&self) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen::<f64>() < self.fill_probability
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(DEFAULT_FILL_PROBABILITY)
    }
}

#[async_trait]
impl OrderPort for SimulatedGateway {
    async fn place_order(&self, order: OrderRequest) -> anyhow::Result<OrderOutcome> {
        let (status, executed_quantity) = if self.roll() {
            (OrderStatus::Filled, order.quantity)
        } else {
            (OrderStatus::Canceled, Decimal::ZERO)
        };

        let outcome = OrderOutcome {
            order_id: order.client_order_id.to_string(),
            status,
            executed_quantity,
            timestamp: Utc::now(),
        };

        tracing::info!(
            order_id = %outcome.order_id,
            symbol = %order.symbol,
            side = order.side.as_str(),
            quantity = %order.quantity,
            ?status,
            "Paper order"
        );

        self.orders.write().await.push((order, outcome.clone()));
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}
