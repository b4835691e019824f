//! Day-by-day backtest driver

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{BacktestError, BacktestSummary, DailyRecord, PnLEngine, PriceHistory, SummaryTracker};
use crate::config::BacktestConfig;
use crate::feed::MarketDataPort;
use crate::rollover::{ContractSegment, RolloverSelector};
use crate::telemetry::{set_gauge, GaugeMetric};

/// USD face value assumed when the exchange does not report one
pub const DEFAULT_CONTRACT_SIZE: Decimal = dec!(100);

/// Ordered daily records and their summary
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub records: Vec<DailyRecord>,
    pub summary: BacktestSummary,
}

/// Runs the carry position over `[start_date, end_date]`
#[derive(Debug, Clone)]
pub struct BacktestRunner {
    config: BacktestConfig,
    selector: RolloverSelector,
    contract_size: Decimal,
}

impl BacktestRunner {
    /// Validate the configuration and the roll calendar before any I/O
    pub fn new(config: BacktestConfig) -> Result<Self, BacktestError> {
        config.validate()?;
        let selector = RolloverSelector::for_range(
            &config.future_pair,
            config.roll_buffer_days,
            config.start_date,
            config.end_date,
        )?;
        let contract_size = config.contract_size.unwrap_or(DEFAULT_CONTRACT_SIZE);

        Ok(Self {
            config,
            selector,
            contract_size,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn selector(&self) -> &RolloverSelector {
        &self.selector
    }

    pub fn contract_size(&self) -> Decimal {
        self.contract_size
    }

    /// Ask the exchange for the pair's face value unless one is configured
    pub async fn detect_contract_size(&mut self, feed: &dyn MarketDataPort) -> Decimal {
        if self.config.contract_size.is_some() {
            return self.contract_size;
        }

        match feed.delivery_contracts(&self.config.future_pair).await {
            Ok(contracts) => {
                if let Some(size) = contracts
                    .iter()
                    .map(|c| c.contract_size)
                    .find(|size| *size > Decimal::ZERO)
                {
                    self.contract_size = size;
                } else {
                    debug!(pair = %self.config.future_pair, "No contract size listed, using default");
                }
            }
            Err(e) => {
                warn!(
                    pair = %self.config.future_pair,
                    error = %e,
                    fallback = %DEFAULT_CONTRACT_SIZE,
                    "Contract size lookup failed"
                );
            }
        }
        self.contract_size
    }

    /// Contracts held over the window and the days each is priced
    pub fn schedule(&self) -> Result<Vec<ContractSegment>, BacktestError> {
        Ok(self
            .selector
            .schedule(self.config.start_date, self.config.end_date)?)
    }

    /// Download every close the run needs
    pub async fn load_history(&self, feed: &dyn MarketDataPort) -> Result<PriceHistory, BacktestError> {
        let segments = self.schedule()?;
        for segment in &segments {
            info!(
                symbol = %segment.symbol,
                expiry = %segment.expiry,
                from = %segment.first_day,
                to = %segment.last_day,
                "Contract segment"
            );
        }
        let history = PriceHistory::load(
            feed,
            &self.config.spot_symbol,
            self.config.start_date,
            self.config.end_date,
            &segments,
        )
        .await?;
        info!(
            spot = history.spot_symbol(),
            contracts = %history.contracts().collect::<Vec<_>>().join(","),
            "Price history loaded"
        );
        Ok(history)
    }

    /// Replay every day of the window over `history`
    pub fn run(&self, history: &PriceHistory) -> Result<BacktestReport, BacktestError> {
        let start = self.config.start_date;
        let end = self.config.end_date;
        let notional = self.config.notional;

        info!(
            %start,
            %end,
            %notional,
            contract_size = %self.contract_size,
            roll_buffer_days = self.config.roll_buffer_days,
            "Starting backtest"
        );

        let mut engine = PnLEngine::new(self.contract_size);
        let mut tracker = SummaryTracker::new(notional);
        let mut records: Vec<DailyRecord> =
            Vec::with_capacity(((end - start).num_days() + 1).max(0) as usize);

        let mut day = start;
        while day <= end {
            let spot = history.spot_close(day)?;

            let record = if records.is_empty() {
                let active = self.selector.active_contract(day)?;
                let future = history.future_close(&active.symbol, day)?;
                engine.open(day, notional, spot, &active.symbol, future)?
            } else if let Some(event) = self.selector.roll_on(day)? {
                let settlement = history.future_close(&event.outgoing_symbol, day)?;
                let incoming = history.future_close(&event.incoming_symbol, day)?;
                let event = event.with_settlement(settlement);
                let record = engine.roll(day, &event, spot, incoming)?;
                info!(
                    date = %day,
                    outgoing = %event.outgoing_symbol,
                    settlement = %settlement,
                    incoming = %event.incoming_symbol,
                    entry = %incoming,
                    contracts = %record.future_contracts,
                    "Rolled contract"
                );
                record
            } else {
                let active = self.selector.active_contract(day)?;
                let future = history.future_close(&active.symbol, day)?;
                engine.step(day, spot, future)
            };

            tracker.record(&record);
            set_gauge(GaugeMetric::CumulativePnl, record.cumulative_pnl);
            set_gauge(GaugeMetric::DrawdownPct, tracker.current_drawdown());
            debug!(
                date = %day,
                spot_pnl = %record.spot_pnl.round_dp(2),
                futures_pnl = %record.futures_pnl.round_dp(2),
                cumulative = %record.cumulative_pnl.round_dp(2),
                "Daily P&L"
            );

            records.push(record);
            day += Duration::days(1);
        }

        let summary = tracker.finish();
        info!(
            days = summary.days,
            rolls = summary.rolls,
            total_pnl = %summary.total_pnl.round_dp(2),
            annualized_return = %summary.annualized_return.round_dp(6),
            "Backtest complete"
        );

        Ok(BacktestReport { records, summary })
    }

    /// Resolve the contract size, download closes and replay
    pub async fn run_with_feed(&mut self, feed: &dyn MarketDataPort) -> Result<BacktestReport, BacktestError> {
        self.detect_contract_size(feed).await;
        let history = self.load_history(feed).await?;
        self.run(&history)
    }

    pub fn start_date(&self) -> NaiveDate {
        self.config.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.config.end_date
    }
}
