//! Prometheus metrics
//!
//! Thin wrappers over the `metrics` facade. Without an installed recorder
//! every call is a no-op, so backtests and tests pay nothing.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::time::Duration;

use crate::execution::OrderStatus;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Quote request round trip
    QuoteFetch,
    /// Order submission round trip
    OrderSubmission,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Spot notional still to execute
    SpotRemainingUsd,
    /// Futures notional still to execute
    FutureRemainingUsd,
    /// Backtest cumulative P&L
    CumulativePnl,
    /// Backtest drawdown percentage
    DrawdownPct,
}

/// Order lifecycle counters
#[derive(Debug, Clone, Copy)]
pub enum OrderEvent {
    Submitted,
    Filled,
    Partial,
    Canceled,
    Failed,
    Dust,
}

impl From<OrderStatus> for OrderEvent {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Filled => OrderEvent::Filled,
            OrderStatus::Partial => OrderEvent::Partial,
            OrderStatus::Canceled => OrderEvent::Canceled,
        }
    }
}

/// Start the Prometheus scrape endpoint
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::QuoteFetch => "carry_quote_fetch_latency_ms",
        LatencyMetric::OrderSubmission => "carry_order_submission_latency_ms",
    };

    ::metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: Decimal) {
    let metric_name = match metric {
        GaugeMetric::SpotRemainingUsd => "carry_spot_remaining_usd",
        GaugeMetric::FutureRemainingUsd => "carry_future_remaining_usd",
        GaugeMetric::CumulativePnl => "carry_backtest_cumulative_pnl_usd",
        GaugeMetric::DrawdownPct => "carry_backtest_drawdown_pct",
    };

    ::metrics::gauge!(metric_name).set(value.to_f64().unwrap_or_default());
}

/// Count an order lifecycle event for a symbol
pub fn record_order(event: OrderEvent, symbol: &str) {
    let metric_name = match event {
        OrderEvent::Submitted => "carry_orders_submitted_total",
        OrderEvent::Filled => "carry_orders_filled_total",
        OrderEvent::Partial => "carry_orders_partial_total",
        OrderEvent::Canceled => "carry_orders_canceled_total",
        OrderEvent::Failed => "carry_orders_failed_total",
        OrderEvent::Dust => "carry_orders_dust_total",
    };

    ::metrics::counter!(metric_name, "symbol" => symbol.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_latency(LatencyMetric::OrderSubmission, Duration::from_millis(12));
        set_gauge(GaugeMetric::CumulativePnl, dec!(-12.5));
        record_order(OrderEvent::Submitted, "BTCUSDT");
    }

    #[test]
    fn test_order_event_from_status() {
        assert!(matches!(OrderEvent::from(OrderStatus::Filled), OrderEvent::Filled));
        assert!(matches!(OrderEvent::from(OrderStatus::Canceled), OrderEvent::Canceled));
    }
}
