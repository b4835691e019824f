//! Execution integration tests
//!
//! Drive the TWAP scheduler end to end against an in-memory feed and the
//! simulated order gateway.

use carry_trader::config::ExecutionConfig;
use carry_trader::execution::{
    Allotment, CancelHandle, ExecutionPlan, ExecutionScheduler, LegPlan, LegStatus, OrderStyle,
    OrderType, RunState, Side, SimulatedGateway, SliceStatus, SpreadExecutor,
};
use carry_trader::feed::{DeliveryContract, InMemoryFeed, Quote};
use carry_trader::instrument::InstrumentSpec;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn spot() -> InstrumentSpec {
    InstrumentSpec::spot("BTCUSDT", dec!(0.00001), dec!(0.00001), dec!(5), dec!(0.01))
}

fn future() -> InstrumentSpec {
    InstrumentSpec::inverse_future("BTCUSD_FRONT", dec!(100), dec!(0.1))
}

fn feed() -> Arc<InMemoryFeed> {
    Arc::new(
        InMemoryFeed::new()
            .with_quote(Quote::new("BTCUSDT", dec!(49990), dec!(50000)))
            .with_quote(Quote::new("BTCUSD_FRONT", dec!(50500), dec!(50510)))
            .with_instrument(spot())
            .with_instrument(future())
            .with_contract(DeliveryContract {
                symbol: "BTCUSD_FRONT".into(),
                pair: "BTCUSD".into(),
                delivery: Utc::now() + chrono::Duration::days(40),
                contract_size: dec!(100),
                trading: true,
            }),
    )
}

fn open_plan(notional: Decimal, slices: usize, style: OrderStyle) -> ExecutionPlan {
    ExecutionPlan::new(
        vec![
            LegPlan::new(spot(), Side::Buy, Allotment::Notional(notional)),
            LegPlan::new(future(), Side::Sell, Allotment::Notional(notional)),
        ],
        slices,
        Duration::from_secs(300),
        style,
        false,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_partial_fills_leave_exact_residual() {
    let gateway = Arc::new(SimulatedGateway::seeded(0.5, 42));
    let mut scheduler = ExecutionScheduler::new(
        open_plan(dec!(120000), 12, OrderStyle::Market),
        feed(),
        gateway.clone(),
        Duration::from_secs(5),
    );

    let report = scheduler.run().await.unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.executed_slices(), 12);

    // Every slice sends both legs: 0.2 BTC and 100 contracts
    let orders = gateway.orders().await;
    assert_eq!(orders.len(), 24);

    for leg in &report.legs {
        assert_eq!(leg.filled + leg.remaining, dec!(120000));

        let filled: Decimal = report
            .slices
            .iter()
            .flat_map(|s| s.legs.iter())
            .filter(|l| l.symbol == leg.symbol)
            .map(|l| l.filled_quantity)
            .sum();
        assert_eq!(filled, leg.filled_quantity);
    }

    for fill in report.slices.iter().flat_map(|s| s.legs.iter()) {
        match fill.status {
            LegStatus::Filled => assert_eq!(fill.residual_notional, dec!(0)),
            LegStatus::Canceled => assert_eq!(fill.filled_quantity, dec!(0)),
            ref other => panic!("unexpected status {:?}", other),
        }
    }

    let remaining: Decimal = report.legs.iter().map(|l| l.remaining_notional).sum();
    assert_eq!(report.total_unfilled_notional(), remaining);
}

#[tokio::test(start_paused = true)]
async fn test_slices_evenly_spaced() {
    let mut scheduler = ExecutionScheduler::new(
        open_plan(dec!(60000), 6, OrderStyle::Market),
        feed(),
        Arc::new(SimulatedGateway::seeded(1.0, 1)),
        Duration::from_secs(5),
    );
    let report = scheduler.run().await.unwrap();

    let first = report.slices[0].deadline;
    for (k, slice) in report.slices.iter().enumerate() {
        assert_eq!(slice.deadline - first, Duration::from_secs(300 * k as u64));
    }
    assert!(report
        .slices
        .windows(2)
        .all(|w| w[0].scheduled_at < w[1].scheduled_at));
    assert_eq!(report.total_unfilled_notional(), dec!(0));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_aborts_remaining_slices() {
    let cancel = CancelHandle::new();
    let mut scheduler = ExecutionScheduler::new(
        open_plan(dec!(60000), 6, OrderStyle::Market),
        feed(),
        Arc::new(SimulatedGateway::seeded(1.0, 1)),
        Duration::from_secs(5),
    )
    .with_cancel(cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12 * 60)).await;
        cancel.cancel();
    });

    let report = scheduler.run().await.unwrap();
    assert_eq!(report.state, RunState::Aborted);
    // Slices at 0, 5 and 10 minutes ran; 15, 20 and 25 did not
    assert_eq!(report.executed_slices(), 3);
    assert!(report.slices[3..]
        .iter()
        .all(|s| s.status == SliceStatus::Aborted));

    let spot_leg = report.leg("BTCUSDT").unwrap();
    assert_eq!(spot_leg.filled, dec!(30000));
    assert_eq!(spot_leg.remaining_notional, dec!(30000));
}

#[tokio::test(start_paused = true)]
async fn test_limit_orders_carry_cushioned_prices() {
    let gateway = Arc::new(SimulatedGateway::seeded(1.0, 7));
    let mut scheduler = ExecutionScheduler::new(
        open_plan(dec!(20000), 2, OrderStyle::Limit { offset_bps: dec!(10) }),
        feed(),
        gateway.clone(),
        Duration::from_secs(5),
    );
    scheduler.run().await.unwrap();

    let orders = gateway.orders().await;
    assert_eq!(orders.len(), 4);
    for (request, _) in &orders {
        assert_eq!(request.order_type, OrderType::Limit);
        let expected = match request.side {
            Side::Buy => dec!(50050),
            Side::Sell => dec!(50449.5),
        };
        assert_eq!(request.price, Some(expected));
    }
}

#[tokio::test]
async fn test_dry_run_spread_open_submits_nothing() {
    let gateway = Arc::new(SimulatedGateway::seeded(1.0, 3));
    let executor = SpreadExecutor::connect(ExecutionConfig::default(), feed(), gateway.clone())
        .await
        .unwrap();

    let outcome = executor.open(CancelHandle::new()).await.unwrap();
    assert_eq!(outcome.report.state, RunState::Completed);
    assert_eq!(outcome.report.slices.len(), 288);
    assert!(gateway.orders().await.is_empty());
    assert!(outcome
        .report
        .slices
        .iter()
        .flat_map(|s| s.legs.iter())
        .all(|l| l.status == LegStatus::DryRun));

    // 1,000,000 USD per leg at ask 50000 and 100 USD per contract
    assert_eq!(outcome.position.spot_quantity, dec!(20));
    assert_eq!(outcome.position.future_contracts, dec!(-10000));
    assert_eq!(outcome.position.entry_price, dec!(50500));
}
