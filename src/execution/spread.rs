//! Long spot / short coin-margined future spread execution

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use super::{
    Allotment, CancelHandle, ExecutionError, ExecutionPlan, ExecutionReport, ExecutionScheduler,
    LegPlan, OrderPort, Side,
};
use crate::config::{ExecutionConfig, InvalidConfig};
use crate::feed::{DeliveryContract, MarketDataPort};
use crate::instrument::InstrumentSpec;
use crate::risk::{Position, DEFAULT_HEDGE_TOLERANCE};

/// Nearest trading delivery contract of `pair` not yet delivered at `now`
pub fn select_front_contract<'a>(
    contracts: &'a [DeliveryContract],
    pair: &str,
    now: DateTime<Utc>,
) -> Option<&'a DeliveryContract> {
    contracts
        .iter()
        .filter(|c| c.pair == pair && c.trading && c.delivery > now)
        .min_by_key(|c| c.delivery)
}

/// Report and resulting position of a spread run
#[derive(Debug, Clone)]
pub struct SpreadOutcome {
    pub report: ExecutionReport,
    pub position: Position,
}

/// Coordinates both legs of the cash-and-carry spread
pub struct SpreadExecutor {
    config: ExecutionConfig,
    feed: Arc<dyn MarketDataPort>,
    gateway: Arc<dyn OrderPort>,
    spot: InstrumentSpec,
    future: InstrumentSpec,
}

impl SpreadExecutor {
    /// Validate settings, pick the futures contract and load both instruments
    pub async fn connect(
        config: ExecutionConfig,
        feed: Arc<dyn MarketDataPort>,
        gateway: Arc<dyn OrderPort>,
    ) -> Result<Self, ExecutionError> {
        config.validate()?;

        let future_symbol = match &config.future_symbol {
            Some(symbol) => symbol.clone(),
            None => {
                let contracts = feed.delivery_contracts(&config.future_pair).await?;
                select_front_contract(&contracts, &config.future_pair, Utc::now())
                    .map(|c| c.symbol.clone())
                    .ok_or_else(|| {
                        anyhow::anyhow!("No active delivery futures for pair {}", config.future_pair)
                    })?
            }
        };

        let spot = feed.get_instrument(&config.spot_symbol).await?;
        let future = feed.get_instrument(&future_symbol).await?;

        tracing::info!(
            spot = %spot.symbol,
            future = %future.symbol,
            contract_size = %future.face_value,
            slices = config.num_slices(),
            "Spread executor ready"
        );

        Ok(Self {
            config,
            feed,
            gateway,
            spot,
            future,
        })
    }

    pub fn spot(&self) -> &InstrumentSpec {
        &self.spot
    }

    pub fn future(&self) -> &InstrumentSpec {
        &self.future
    }

    /// Buy spot and sell futures, `notional_usdt` per leg
    pub fn open_plan(&self) -> Result<ExecutionPlan, InvalidConfig> {
        let notional = self.config.notional_usdt;
        ExecutionPlan::from_config(
            &self.config,
            vec![
                LegPlan::new(self.spot.clone(), Side::Buy, Allotment::Notional(notional)),
                LegPlan::new(self.future.clone(), Side::Sell, Allotment::Notional(notional)),
            ],
        )
    }

    /// Sell `spot_quantity` and buy back `contracts` (sign ignored)
    pub fn close_plan(&self, spot_quantity: Decimal, contracts: Decimal) -> Result<ExecutionPlan, InvalidConfig> {
        if spot_quantity < Decimal::ZERO {
            return Err(InvalidConfig(format!("spot quantity {} is negative", spot_quantity)));
        }
        ExecutionPlan::from_config(
            &self.config,
            vec![
                LegPlan::new(self.spot.clone(), Side::Sell, Allotment::Quantity(spot_quantity)),
                LegPlan::new(self.future.clone(), Side::Buy, Allotment::Quantity(contracts.abs())),
            ],
        )
    }

    /// Scheduler for a plan against this executor's ports
    pub fn scheduler(&self, plan: ExecutionPlan) -> ExecutionScheduler {
        ExecutionScheduler::new(
            plan,
            self.feed.clone(),
            self.gateway.clone(),
            self.config.order_timeout(),
        )
    }

    /// Open the spread via TWAP
    pub async fn open(&self, cancel: CancelHandle) -> Result<SpreadOutcome, ExecutionError> {
        let plan = self.open_plan()?;
        tracing::info!(
            notional = %self.config.notional_usdt,
            spot = %self.spot.symbol,
            future = %self.future.symbol,
            slices = plan.slices,
            "Opening spread"
        );

        let report = self.scheduler(plan).with_cancel(cancel).run().await?;
        let mut position = Position::flat();
        self.apply_fills(&report, &mut position, Decimal::ONE);
        self.log_hedge(&position, &report);
        Ok(SpreadOutcome { report, position })
    }

    /// Unwind `spot_quantity` BTC and `contracts` futures via TWAP
    ///
    /// The returned position is what is still held afterwards.
    pub async fn close(
        &self,
        spot_quantity: Decimal,
        contracts: Decimal,
        cancel: CancelHandle,
    ) -> Result<SpreadOutcome, ExecutionError> {
        let plan = self.close_plan(spot_quantity, contracts)?;
        tracing::info!(
            %spot_quantity,
            contracts = %contracts.abs(),
            future = %self.future.symbol,
            slices = plan.slices,
            "Closing spread"
        );

        let report = self.scheduler(plan).with_cancel(cancel).run().await?;
        let mut position = Position {
            spot_quantity,
            future_symbol: Some(self.future.symbol.clone()),
            future_contracts: -contracts.abs(),
            entry_price: Decimal::ZERO,
        };
        self.apply_fills(&report, &mut position, -Decimal::ONE);
        Ok(SpreadOutcome { report, position })
    }

    /// Add (`direction = 1`) or remove (`-1`) executed quantities
    fn apply_fills(&self, report: &ExecutionReport, position: &mut Position, direction: Decimal) {
        if let Some(leg) = report.leg(&self.spot.symbol) {
            position.spot_quantity += direction * leg.filled_quantity;
        }
        if let Some(leg) = report.leg(&self.future.symbol) {
            position.future_contracts -= direction * leg.filled_quantity;
            position.future_symbol = Some(self.future.symbol.clone());
        }

        // Volume-weighted futures entry
        let (qty, value) = report
            .slices
            .iter()
            .flat_map(|s| s.legs.iter())
            .filter(|l| l.symbol == self.future.symbol)
            .filter_map(|l| l.reference_price.map(|p| (l.filled_quantity, l.filled_quantity * p)))
            .fold((Decimal::ZERO, Decimal::ZERO), |acc, (q, v)| (acc.0 + q, acc.1 + v));
        if direction > Decimal::ZERO && !qty.is_zero() {
            position.entry_price = (value / qty).round_dp(self.future.tick_size.scale());
        }
    }

    fn log_hedge(&self, position: &Position, report: &ExecutionReport) {
        let spot_price = report
            .slices
            .iter()
            .rev()
            .flat_map(|s| s.legs.iter())
            .find(|l| l.symbol == self.spot.symbol)
            .and_then(|l| l.reference_price);
        let Some(spot_price) = spot_price else {
            return;
        };
        let ratio = position
            .hedge_ratio(spot_price, self.future.face_value)
            .map(|r| r.round_dp(4))
            .unwrap_or_default();

        if position.is_hedged(spot_price, self.future.face_value, DEFAULT_HEDGE_TOLERANCE) {
            tracing::info!(
                spot_quantity = %position.spot_quantity,
                contracts = %position.future_contracts,
                hedge_ratio = %ratio,
                "Spread hedged"
            );
        } else {
            tracing::warn!(
                spot_usd = %position.spot_notional(spot_price).round_dp(2),
                hedge_usd = %position.hedge_notional(self.future.face_value),
                hedge_ratio = %ratio,
                "Spread legs out of balance"
            );
        }
    }
}
