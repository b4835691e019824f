//! TWAP execution plan
//!
//! A plan is a fixed number of equally spaced slices. Each leg's total is
//! split into per-slice allotments up front; slices never borrow from one
//! another, so a canceled slice leaves its allotment unfilled.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::time::Instant;

use super::Side;
use crate::config::{ExecutionConfig, InvalidConfig, MAX_PRICE_OFFSET_BPS};
use crate::feed::Quote;
use crate::instrument::{round_down_to_step, InstrumentSpec};

/// Decimal places kept by per-slice allotments
const ALLOTMENT_SCALE: u32 = 8;

/// Hard cap on the limit cushion: 10 bps
const MAX_CUSHION: Decimal = dec!(0.001);

/// What a leg has to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allotment {
    /// USD notional (opening)
    Notional(Decimal),
    /// Instrument quantity (closing)
    Quantity(Decimal),
}

impl Allotment {
    pub fn amount(&self) -> Decimal {
        match self {
            Allotment::Notional(a) | Allotment::Quantity(a) => *a,
        }
    }

    /// Same unit, different amount
    pub fn with_amount(&self, amount: Decimal) -> Allotment {
        match self {
            Allotment::Notional(_) => Allotment::Notional(amount),
            Allotment::Quantity(_) => Allotment::Quantity(amount),
        }
    }

    /// Split into `n` allotments summing exactly to this one
    pub fn split(&self, n: usize) -> Vec<Allotment> {
        split_evenly(self.amount(), n)
            .into_iter()
            .map(|a| self.with_amount(a))
            .collect()
    }

    /// USD value of `amount` in this allotment's unit
    pub fn to_notional(&self, amount: Decimal, price: Decimal, spec: &InstrumentSpec) -> Decimal {
        match self {
            Allotment::Notional(_) => amount,
            Allotment::Quantity(_) => spec.notional(amount, price),
        }
    }

    /// Instrument units of `amount` in this allotment's unit
    pub fn to_quantity(&self, amount: Decimal, price: Decimal, spec: &InstrumentSpec) -> Decimal {
        match self {
            Allotment::Notional(_) => spec.quantity_for(amount, price),
            Allotment::Quantity(_) => amount,
        }
    }

    /// Express an executed instrument quantity in this allotment's unit
    pub fn from_quantity(&self, quantity: Decimal, price: Decimal, spec: &InstrumentSpec) -> Decimal {
        match self {
            Allotment::Notional(_) => spec.notional(quantity, price),
            Allotment::Quantity(_) => quantity,
        }
    }
}

/// Split `total` into `n` parts of `total / n` (8 dp), the last absorbing
/// the rounding so the parts sum to `total` exactly
pub fn split_evenly(total: Decimal, n: usize) -> Vec<Decimal> {
    let n = n.max(1);
    let base = round_down_to_step(total / Decimal::from(n), Decimal::new(1, ALLOTMENT_SCALE));
    let mut parts = vec![base; n];
    parts[n - 1] = total - base * Decimal::from(n - 1);
    parts
}

/// One leg of the hedge
#[derive(Debug, Clone)]
pub struct LegPlan {
    pub instrument: InstrumentSpec,
    pub side: Side,
    pub total: Allotment,
}

impl LegPlan {
    pub fn new(instrument: InstrumentSpec, side: Side, total: Allotment) -> Self {
        Self {
            instrument,
            side,
            total,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.instrument.symbol
    }
}

/// How slice orders are priced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStyle {
    Market,
    /// Limit order crossing the touch by at most `offset_bps` (capped at 10)
    Limit { offset_bps: Decimal },
}

/// Limit price for a slice order, rounded down to the tick
///
/// Buys pay at most `ask × (1 + offset)`, sells accept at least
/// `bid × (1 − offset)`, with the offset capped at 10 bps.
pub fn limit_price(side: Side, quote: &Quote, offset_bps: Decimal, spec: &InstrumentSpec) -> Decimal {
    let offset = offset_bps / dec!(10000);
    let price = match side {
        Side::Buy => (quote.ask * (Decimal::ONE + offset)).min(quote.ask * (Decimal::ONE + MAX_CUSHION)),
        Side::Sell => (quote.bid * (Decimal::ONE - offset)).max(quote.bid * (Decimal::ONE - MAX_CUSHION)),
    };
    spec.round_price(price)
}

/// Fixed TWAP plan for one run
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub legs: Vec<LegPlan>,
    pub slices: usize,
    pub interval: Duration,
    pub order_style: OrderStyle,
    /// Log orders instead of submitting them, without waiting between slices
    pub dry_run: bool,
}

impl ExecutionPlan {
    pub fn new(
        legs: Vec<LegPlan>,
        slices: usize,
        interval: Duration,
        order_style: OrderStyle,
        dry_run: bool,
    ) -> Result<Self, InvalidConfig> {
        if legs.is_empty() {
            return Err(InvalidConfig("execution plan has no legs".into()));
        }
        if slices == 0 {
            return Err(InvalidConfig("execution plan needs at least one slice".into()));
        }
        if slices > 1 && interval.is_zero() {
            return Err(InvalidConfig("slice interval must be positive".into()));
        }
        if u32::try_from(slices)
            .ok()
            .and_then(|n| interval.checked_mul(n))
            .is_none()
        {
            return Err(InvalidConfig(format!(
                "{} slices every {:?} overflows the execution window",
                slices, interval
            )));
        }
        for leg in &legs {
            if leg.total.amount() < Decimal::ZERO {
                return Err(InvalidConfig(format!(
                    "negative target {} for {}",
                    leg.total.amount(),
                    leg.symbol()
                )));
            }
        }
        if let OrderStyle::Limit { offset_bps } = order_style {
            if offset_bps < Decimal::ZERO || offset_bps > MAX_PRICE_OFFSET_BPS {
                return Err(InvalidConfig(format!("price offset {} bps out of range", offset_bps)));
            }
        }

        Ok(Self {
            legs,
            slices,
            interval,
            order_style,
            dry_run,
        })
    }

    /// Plan from execution settings
    pub fn from_config(config: &ExecutionConfig, legs: Vec<LegPlan>) -> Result<Self, InvalidConfig> {
        config.validate()?;
        let order_style = if config.use_market_orders {
            OrderStyle::Market
        } else {
            OrderStyle::Limit {
                offset_bps: config.price_offset_bps,
            }
        };
        Self::new(
            legs,
            config.num_slices(),
            config.slice_interval(),
            order_style,
            config.dry_run,
        )
    }

    /// Total time covered: `interval × (slices − 1)` plus one slice
    pub fn window(&self) -> Duration {
        self.offset(self.slices)
    }

    /// Offset of slice `k` from the start
    pub fn offset(&self, index: usize) -> Duration {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        self.interval.saturating_mul(index)
    }

    /// Build the slice schedule anchored at `start`
    pub fn build_slices(&self, start: Instant, wall_start: DateTime<Utc>) -> Vec<Slice> {
        let allotments: Vec<Vec<Allotment>> =
            self.legs.iter().map(|leg| leg.total.split(self.slices)).collect();

        (0..self.slices)
            .map(|index| {
                let offset = self.offset(index);
                let legs = self
                    .legs
                    .iter()
                    .zip(&allotments)
                    .map(|(leg, parts)| LegFill::pending(leg, parts[index]))
                    .collect();
                Slice {
                    index,
                    scheduled_at: wall_start
                        + chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero()),
                    deadline: start + offset,
                    legs,
                    status: SliceStatus::Pending,
                }
            })
            .collect()
    }
}

/// Slice lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceStatus {
    Pending,
    Executed,
    /// Not run because the execution was canceled
    Aborted,
}

/// One time slot of the plan
#[derive(Debug, Clone)]
pub struct Slice {
    pub index: usize,
    /// Wall-clock time the slice is due
    pub scheduled_at: DateTime<Utc>,
    /// Monotonic deadline the scheduler waits for
    pub deadline: Instant,
    pub legs: Vec<LegFill>,
    pub status: SliceStatus,
}

/// Outcome of one leg within a slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegStatus {
    Pending,
    Filled,
    Partial,
    Canceled,
    /// Below the lot or notional minimum, not sent
    Dust,
    /// Quote or order call failed or timed out
    Failed(String),
    /// Logged, not sent
    DryRun,
    Aborted,
}

/// Per-leg record on a slice
#[derive(Debug, Clone)]
pub struct LegFill {
    pub symbol: String,
    pub side: Side,
    /// This slice's fixed share of the leg total
    pub allotment: Allotment,
    /// Quantity sent (after lot rounding)
    pub quantity: Decimal,
    /// Touch price the slice was sized at
    pub reference_price: Option<Decimal>,
    /// Limit price, if any
    pub limit_price: Option<Decimal>,
    pub status: LegStatus,
    pub filled_quantity: Decimal,
    pub filled_notional: Decimal,
    /// USD value of what was sent but not filled
    pub residual_notional: Decimal,
}

impl LegFill {
    fn pending(leg: &LegPlan, allotment: Allotment) -> Self {
        Self {
            symbol: leg.instrument.symbol.clone(),
            side: leg.side,
            allotment,
            quantity: Decimal::ZERO,
            reference_price: None,
            limit_price: None,
            status: LegStatus::Pending,
            filled_quantity: Decimal::ZERO,
            filled_notional: Decimal::ZERO,
            residual_notional: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot() -> InstrumentSpec {
        InstrumentSpec::spot("BTCUSDT", dec!(0.00001), dec!(0.00001), dec!(5), dec!(0.01))
    }

    fn future() -> InstrumentSpec {
        InstrumentSpec::inverse_future("BTCUSD_240628", dec!(100), dec!(0.1))
    }

    fn legs(total: Decimal) -> Vec<LegPlan> {
        vec![
            LegPlan::new(spot(), Side::Buy, Allotment::Notional(total)),
            LegPlan::new(future(), Side::Sell, Allotment::Notional(total)),
        ]
    }

    #[test]
    fn test_split_sums_exactly() {
        for total in [dec!(1000000), dec!(1), dec!(0.00000007), dec!(12345.6789), dec!(0)] {
            for n in [1usize, 2, 3, 7, 288, 1000] {
                let parts = split_evenly(total, n);
                assert_eq!(parts.len(), n);
                assert_eq!(parts.iter().copied().sum::<Decimal>(), total, "{} / {}", total, n);
            }
        }
    }

    #[test]
    fn test_split_parts_equal_except_last() {
        let parts = split_evenly(dec!(100), 3);
        assert_eq!(parts[0], dec!(33.33333333));
        assert_eq!(parts[1], dec!(33.33333333));
        assert_eq!(parts[2], dec!(33.33333334));
    }

    #[test]
    fn test_limit_price_cushion() {
        let quote = Quote::new("BTCUSDT", dec!(50000), dec!(50000));

        // Default 10 bps matches the 1.001 / 0.999 cushion
        assert_eq!(limit_price(Side::Buy, &quote, dec!(10), &spot()), dec!(50050));
        assert_eq!(limit_price(Side::Sell, &quote, dec!(10), &spot()), dec!(49950));

        // Narrower offsets are honored
        assert_eq!(limit_price(Side::Buy, &quote, dec!(5), &spot()), dec!(50025));
        assert_eq!(limit_price(Side::Sell, &quote, dec!(5), &spot()), dec!(49975));

        // Wider offsets are capped
        assert_eq!(limit_price(Side::Buy, &quote, dec!(50), &spot()), dec!(50050));
    }

    #[test]
    fn test_limit_price_rounds_to_tick() {
        let quote = Quote::new("BTCUSD_240628", dec!(43210.37), dec!(43210.37));
        let price = limit_price(Side::Buy, &quote, dec!(10), &future());
        assert_eq!(price, dec!(43253.5));
    }

    #[test]
    fn test_build_slices_even_spacing() {
        let plan = ExecutionPlan::new(
            legs(dec!(1000)),
            4,
            Duration::from_secs(300),
            OrderStyle::Market,
            false,
        )
        .unwrap();
        let start = Instant::now();
        let wall = Utc::now();
        let slices = plan.build_slices(start, wall);

        assert_eq!(slices.len(), 4);
        for (k, slice) in slices.iter().enumerate() {
            assert_eq!(slice.index, k);
            assert_eq!(slice.deadline, start + Duration::from_secs(300 * k as u64));
            assert_eq!(slice.legs.len(), 2);
            assert_eq!(slice.legs[0].allotment, Allotment::Notional(dec!(250)));
            assert_eq!(slice.status, SliceStatus::Pending);
        }
        assert!(slices.windows(2).all(|w| w[0].scheduled_at < w[1].scheduled_at));
        assert_eq!(plan.window(), Duration::from_secs(1200));
    }

    #[test]
    fn test_plan_validation() {
        assert!(ExecutionPlan::new(vec![], 1, Duration::ZERO, OrderStyle::Market, false).is_err());
        assert!(ExecutionPlan::new(legs(dec!(1)), 0, Duration::ZERO, OrderStyle::Market, false).is_err());
        assert!(ExecutionPlan::new(legs(dec!(1)), 2, Duration::ZERO, OrderStyle::Market, false).is_err());
        assert!(ExecutionPlan::new(legs(dec!(1)), 1, Duration::ZERO, OrderStyle::Market, false).is_ok());
        assert!(ExecutionPlan::new(
            legs(dec!(1)),
            1,
            Duration::ZERO,
            OrderStyle::Limit { offset_bps: dec!(11) },
            false
        )
        .is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let err = ExecutionPlan::new(legs(dec!(1)), 3, Duration::MAX / 2, OrderStyle::Market, false)
            .unwrap_err();
        assert!(err.0.contains("overflows"));

        let too_many = u32::MAX as usize + 1;
        assert!(ExecutionPlan::new(
            legs(dec!(1)),
            too_many,
            Duration::from_millis(1),
            OrderStyle::Market,
            false
        )
        .is_err());
    }

    #[test]
    fn test_fractional_interval_offsets() {
        let config = ExecutionConfig {
            duration_hours: dec!(1),
            slice_interval_minutes: dec!(2.5),
            ..Default::default()
        };
        let plan = ExecutionPlan::from_config(&config, legs(dec!(1000))).unwrap();
        assert_eq!(plan.slices, 24);
        assert_eq!(plan.offset(1), Duration::from_secs(150));
        assert_eq!(plan.offset(23), Duration::from_secs(3450));
        assert_eq!(plan.window(), Duration::from_secs(3600));
    }

    #[test]
    fn test_from_config() {
        let config = ExecutionConfig {
            duration_hours: dec!(1),
            slice_interval_minutes: dec!(15),
            use_market_orders: false,
            price_offset_bps: dec!(5),
            ..Default::default()
        };
        let plan = ExecutionPlan::from_config(&config, legs(dec!(1000))).unwrap();
        assert_eq!(plan.slices, 4);
        assert_eq!(plan.interval, Duration::from_secs(900));
        assert_eq!(plan.order_style, OrderStyle::Limit { offset_bps: dec!(5) });

        let bad = ExecutionConfig {
            notional_usdt: dec!(-5),
            ..Default::default()
        };
        assert!(ExecutionPlan::from_config(&bad, legs(dec!(1))).is_err());
    }

    #[test]
    fn test_allotment_unit_conversions() {
        let spec = future();
        let notional = Allotment::Notional(dec!(1000));
        assert_eq!(notional.to_quantity(dec!(1000), dec!(50000), &spec), dec!(10));
        assert_eq!(notional.from_quantity(dec!(3), dec!(50000), &spec), dec!(300));

        let quantity = Allotment::Quantity(dec!(10));
        assert_eq!(quantity.to_notional(dec!(10), dec!(50000), &spec), dec!(1000));
        assert_eq!(quantity.from_quantity(dec!(3), dec!(50000), &spec), dec!(3));
    }
}
