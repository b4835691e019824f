//! Time-sliced execution scheduler
//!
//! Runs an [`ExecutionPlan`] slice by slice: wait for the slice's absolute
//! deadline, quote each leg, size the slice with the lot rules, submit, and
//! record the outcome. Deadlines are `start + k·interval` on the monotonic
//! clock, so a late slice runs immediately without pushing later ones back.
//!
//! Lot rounding leftovers (including dust) carry into the next slice of the
//! same leg. Unfilled quantity from canceled or failed orders does not; it
//! stays as residual exposure in the report.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::plan::{Allotment, ExecutionPlan, LegFill, LegPlan, LegStatus, OrderStyle, Slice, SliceStatus};
use super::{ExecutionError, OrderPort, OrderRequest, OrderStatus, Side};
use crate::feed::{MarketDataPort, Quote};
use crate::risk::{round_quantity, size, Sizing};
use crate::telemetry::{self, GaugeMetric, LatencyMetric, OrderEvent};

/// Run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Planned,
    Running,
    Completed,
    Aborted,
}

/// Cooperative cancellation, observed between slices
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-leg totals at the end of a run
#[derive(Debug, Clone)]
pub struct LegSummary {
    pub symbol: String,
    pub side: Side,
    /// Leg target in its allotment unit
    pub target: Allotment,
    /// Executed amount in the allotment unit
    pub filled: Decimal,
    /// Executed instrument quantity
    pub filled_quantity: Decimal,
    /// Target minus filled, in the allotment unit
    pub remaining: Decimal,
    /// USD value of what remains
    pub remaining_notional: Decimal,
    /// Remaining exposure too small to trade
    pub residual_dust: bool,
}

/// Result of an execution run
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub state: RunState,
    pub slices: Vec<Slice>,
    pub legs: Vec<LegSummary>,
}

impl ExecutionReport {
    /// USD notional left unexecuted across all legs
    pub fn total_unfilled_notional(&self) -> Decimal {
        self.legs.iter().map(|l| l.remaining_notional).sum()
    }

    pub fn leg(&self, symbol: &str) -> Option<&LegSummary> {
        self.legs.iter().find(|l| l.symbol == symbol)
    }

    /// Slices that actually ran
    pub fn executed_slices(&self) -> usize {
        self.slices
            .iter()
            .filter(|s| s.status == SliceStatus::Executed)
            .count()
    }

    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        let mut out = String::new();
        out.push_str("\n══════════════════════════════════════════════════════\n");
        out.push_str("               EXECUTION REPORT\n");
        out.push_str("══════════════════════════════════════════════════════\n\n");
        out.push_str(&format!(
            "State:            {:?}\nSlices:           {}/{}\n",
            self.state,
            self.executed_slices(),
            self.slices.len()
        ));

        out.push_str("\nSLICES\n───────────────────────────────────────────────────────\n");
        for slice in &self.slices {
            let legs: Vec<String> = slice
                .legs
                .iter()
                .map(|l| format!("{} {} {} {:?}", l.side.as_str(), l.quantity, l.symbol, l.status))
                .collect();
            out.push_str(&format!(
                "#{:<4} {}  {}\n",
                slice.index,
                slice.scheduled_at.format("%H:%M:%S"),
                legs.join(" | ")
            ));
        }

        out.push_str("\nRESIDUAL EXPOSURE\n───────────────────────────────────────────────────────\n");
        for leg in &self.legs {
            out.push_str(&format!(
                "{:<16} {:<4} filled {} of {}  remaining {} (${:.2}){}\n",
                leg.symbol,
                leg.side.as_str(),
                leg.filled.round_dp(8),
                leg.target.amount(),
                leg.remaining.round_dp(8),
                leg.remaining_notional,
                if leg.residual_dust { " dust" } else { "" }
            ));
        }
        out.push_str(&format!(
            "Unfilled notional: ${:.2}\n",
            self.total_unfilled_notional()
        ));
        out.push_str("══════════════════════════════════════════════════════\n");
        out
    }
}

struct LegProgress {
    filled: Decimal,
    filled_quantity: Decimal,
    carry: Decimal,
    last_price: Option<Decimal>,
}

/// Drives one execution run
pub struct ExecutionScheduler {
    plan: ExecutionPlan,
    feed: Arc<dyn MarketDataPort>,
    gateway: Arc<dyn OrderPort>,
    call_timeout: Duration,
    state: RunState,
    cancel: CancelHandle,
}

impl ExecutionScheduler {
    pub fn new(
        plan: ExecutionPlan,
        feed: Arc<dyn MarketDataPort>,
        gateway: Arc<dyn OrderPort>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            plan,
            feed,
            gateway,
            call_timeout,
            state: RunState::Planned,
            cancel: CancelHandle::new(),
        }
    }

    /// Use an externally created cancel handle
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Handle that cancels this run between slices
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Execute every slice in order
    pub async fn run(&mut self) -> Result<ExecutionReport, ExecutionError> {
        if self.state != RunState::Planned {
            return Err(ExecutionError::AlreadyStarted);
        }
        self.state = RunState::Running;

        let start = Instant::now();
        let mut slices = self.plan.build_slices(start, Utc::now());
        let mut progress: Vec<LegProgress> = self
            .plan
            .legs
            .iter()
            .map(|_| LegProgress {
                filled: Decimal::ZERO,
                filled_quantity: Decimal::ZERO,
                carry: Decimal::ZERO,
                last_price: None,
            })
            .collect();

        tracing::info!(
            slices = self.plan.slices,
            interval_secs = self.plan.interval.as_secs(),
            legs = self.plan.legs.len(),
            dry_run = self.plan.dry_run,
            gateway = self.gateway.name(),
            "Execution started"
        );

        let total = slices.len();
        for index in 0..total {
            if !self.plan.dry_run {
                tokio::select! {
                    _ = tokio::time::sleep_until(slices[index].deadline) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
            if self.cancel.is_cancelled() {
                for slice in &mut slices[index..] {
                    slice.status = SliceStatus::Aborted;
                    for leg in &mut slice.legs {
                        leg.status = LegStatus::Aborted;
                    }
                }
                tracing::warn!(slice = index + 1, total, "Execution canceled");
                self.state = RunState::Aborted;
                break;
            }

            let lateness = Instant::now().saturating_duration_since(slices[index].deadline);
            if lateness > Duration::from_secs(1) {
                tracing::debug!(slice = index + 1, late_ms = lateness.as_millis() as u64, "Slice running late");
            }

            for (leg_index, leg) in self.plan.legs.iter().enumerate() {
                let fill = &mut slices[index].legs[leg_index];
                self.execute_leg(index, leg, fill, &mut progress[leg_index]).await;
            }
            slices[index].status = SliceStatus::Executed;

            self.log_progress(index, total, &progress);
        }

        if self.state == RunState::Running {
            self.state = RunState::Completed;
        }

        let legs = self.summarize(&progress);
        for leg in &legs {
            if leg.remaining > Decimal::ZERO {
                tracing::warn!(
                    symbol = %leg.symbol,
                    remaining = %leg.remaining,
                    remaining_usd = %leg.remaining_notional.round_dp(2),
                    residual_dust = leg.residual_dust,
                    "Execution finished with residual exposure"
                );
            }
        }

        tracing::info!(state = ?self.state, "Execution finished");
        Ok(ExecutionReport {
            state: self.state,
            slices,
            legs,
        })
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, ExecutionError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.call_timeout, self.feed.get_quote(symbol)).await;
        telemetry::record_latency(LatencyMetric::QuoteFetch, started.elapsed());

        match result {
            Err(_) => Err(ExecutionError::Timeout {
                operation: "quote",
                timeout: self.call_timeout,
            }),
            Ok(Err(e)) => Err(ExecutionError::Port(e)),
            Ok(Ok(quote)) if !quote.is_valid() => Err(ExecutionError::Port(anyhow::anyhow!(
                "unusable quote bid={} ask={}",
                quote.bid,
                quote.ask
            ))),
            Ok(Ok(quote)) => Ok(quote),
        }
    }

    async fn submit(&self, order: OrderRequest) -> Result<super::OrderOutcome, ExecutionError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.call_timeout, self.gateway.place_order(order)).await;
        telemetry::record_latency(LatencyMetric::OrderSubmission, started.elapsed());

        match result {
            Err(_) => Err(ExecutionError::Timeout {
                operation: "order",
                timeout: self.call_timeout,
            }),
            Ok(result) => result.map_err(ExecutionError::Port),
        }
    }

    fn fail(&self, slice: usize, leg: &LegPlan, fill: &mut LegFill, progress: &mut LegProgress, cause: ExecutionError) {
        let err = ExecutionError::SliceSubmissionFailure {
            slice: slice + 1,
            symbol: leg.instrument.symbol.clone(),
            reason: cause.to_string(),
        };
        tracing::warn!(error = %err, "Slice leg failed");
        telemetry::record_order(OrderEvent::Failed, &leg.instrument.symbol);

        let price = fill.reference_price.or(progress.last_price).unwrap_or(Decimal::ZERO);
        fill.residual_notional = fill
            .allotment
            .to_notional(fill.allotment.amount(), price, &leg.instrument);
        fill.status = LegStatus::Failed(err.to_string());
    }

    async fn execute_leg(&self, slice: usize, leg: &LegPlan, fill: &mut LegFill, progress: &mut LegProgress) {
        let spec = &leg.instrument;

        let quote = match self.quote(&spec.symbol).await {
            Ok(quote) => quote,
            Err(e) => return self.fail(slice, leg, fill, progress, e),
        };
        let price = quote.price_for(leg.side);
        fill.reference_price = Some(price);
        progress.last_price = Some(price);

        let target = fill.allotment.amount() + progress.carry;
        let sizing = match fill.allotment {
            Allotment::Notional(_) => size(target, price, spec),
            Allotment::Quantity(_) => round_quantity(target, price, spec),
        };
        let quantity = match sizing {
            Ok(Sizing::Quantity(q)) => q,
            Ok(Sizing::DustBelowMinimum { quantity, notional }) => {
                tracing::warn!(
                    slice = slice + 1,
                    symbol = %spec.symbol,
                    %quantity,
                    notional = %notional.round_dp(2),
                    min_notional = %spec.min_notional,
                    "Slice below exchange minimum, skipped"
                );
                telemetry::record_order(OrderEvent::Dust, &spec.symbol);
                progress.carry = target;
                fill.status = LegStatus::Dust;
                return;
            }
            Err(e) => {
                let err = ExecutionError::Port(anyhow::anyhow!(e));
                return self.fail(slice, leg, fill, progress, err);
            }
        };

        if quantity.is_zero() {
            progress.carry = target;
            fill.status = LegStatus::Dust;
            return;
        }

        progress.carry = target - fill.allotment.from_quantity(quantity, price, spec);
        fill.quantity = quantity;

        let order = match self.plan.order_style {
            OrderStyle::Market => OrderRequest::market(&spec.symbol, leg.side, quantity),
            OrderStyle::Limit { offset_bps } => {
                let limit = super::plan::limit_price(leg.side, &quote, offset_bps, spec);
                fill.limit_price = Some(limit);
                OrderRequest::limit(&spec.symbol, leg.side, quantity, limit)
            }
        };

        let executed = if self.plan.dry_run {
            tracing::info!(
                slice = slice + 1,
                symbol = %order.symbol,
                side = order.side.as_str(),
                order_type = order.order_type.as_str(),
                quantity = %order.quantity,
                price = ?order.price,
                "Dry-run order"
            );
            fill.status = LegStatus::DryRun;
            quantity
        } else {
            telemetry::record_order(OrderEvent::Submitted, &spec.symbol);
            match self.submit(order).await {
                Ok(outcome) => {
                    telemetry::record_order(outcome.status.into(), &spec.symbol);
                    fill.status = match outcome.status {
                        OrderStatus::Filled => LegStatus::Filled,
                        OrderStatus::Partial => LegStatus::Partial,
                        OrderStatus::Canceled => LegStatus::Canceled,
                    };
                    outcome.executed_quantity.min(quantity)
                }
                Err(e) => {
                    self.fail(slice, leg, fill, progress, e);
                    fill.residual_notional = spec.notional(quantity, price);
                    return;
                }
            }
        };

        fill.filled_quantity = executed;
        fill.filled_notional = spec.notional(executed, price);
        fill.residual_notional = spec.notional(quantity - executed, price);
        progress.filled_quantity += executed;
        progress.filled += fill.allotment.from_quantity(executed, price, spec);
    }

    fn log_progress(&self, index: usize, total: usize, progress: &[LegProgress]) {
        for (leg, p) in self.plan.legs.iter().zip(progress) {
            let price = p.last_price.unwrap_or(Decimal::ZERO);
            let remaining = (leg.total.amount() - p.filled).max(Decimal::ZERO);
            let remaining_usd = leg.total.to_notional(remaining, price, &leg.instrument);
            let remaining_units = leg.total.to_quantity(remaining, price, &leg.instrument);

            tracing::info!(
                slice = index + 1,
                total,
                symbol = %leg.instrument.symbol,
                remaining_usd = %remaining_usd.round_dp(2),
                remaining_units = %remaining_units.round_dp(8),
                "Slice complete"
            );

            let gauge = if leg.instrument.is_spot() {
                GaugeMetric::SpotRemainingUsd
            } else {
                GaugeMetric::FutureRemainingUsd
            };
            telemetry::set_gauge(gauge, remaining_usd);
        }
    }

    fn summarize(&self, progress: &[LegProgress]) -> Vec<LegSummary> {
        self.plan
            .legs
            .iter()
            .zip(progress)
            .map(|(leg, p)| {
                let price = p.last_price.unwrap_or(Decimal::ZERO);
                let remaining = (leg.total.amount() - p.filled).max(Decimal::ZERO);
                let remaining_notional = leg.total.to_notional(remaining, price, &leg.instrument);
                LegSummary {
                    symbol: leg.instrument.symbol.clone(),
                    side: leg.side,
                    target: leg.total,
                    filled: p.filled,
                    filled_quantity: p.filled_quantity,
                    remaining,
                    remaining_notional,
                    residual_dust: remaining > Decimal::ZERO
                        && remaining_notional < leg.instrument.min_notional,
                }
            })
            .collect()
    }
}
