//! Quarterly delivery calendar
//!
//! Coin-margined quarterly contracts deliver on the last Friday of March,
//! June, September and December. Everything here is plain date arithmetic
//! so it can be checked without any market data.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::RollCalendarError;

/// Quarter-end delivery months
pub const QUARTER_MONTHS: [u32; 4] = [3, 6, 9, 12];

/// Default days before expiry on which the position is rolled
pub const DEFAULT_ROLL_BUFFER_DAYS: u32 = 1;

/// Last Friday of a month
pub fn last_friday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = first_of_next.pred_opt()?;
    let friday = Weekday::Fri.num_days_from_monday();
    let back = (last_day.weekday().num_days_from_monday() + 7 - friday) % 7;
    Some(last_day - Duration::days(back as i64))
}

/// All quarterly expiries for `first_year..=last_year`, ascending
pub fn quarterly_expiries(first_year: i32, last_year: i32) -> Vec<NaiveDate> {
    (first_year..=last_year)
        .flat_map(|year| QUARTER_MONTHS.into_iter().filter_map(move |m| last_friday(year, m)))
        .collect()
}

/// Delivery contract symbol, e.g. `BTCUSD_240628`
pub fn contract_symbol(pair: &str, expiry: NaiveDate) -> String {
    format!("{}_{}", pair, expiry.format("%y%m%d"))
}

/// Split a delivery contract symbol into pair and expiry
pub fn parse_contract_symbol(symbol: &str) -> Option<(&str, NaiveDate)> {
    let (pair, suffix) = symbol.rsplit_once('_')?;
    if suffix.len() != 6 {
        return None;
    }
    let expiry = NaiveDate::parse_from_str(suffix, "%y%m%d").ok()?;
    Some((pair, expiry))
}

/// Contract that should be held on a given day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveContract {
    pub symbol: String,
    pub expiry: NaiveDate,
}

/// Switch from an expiring contract to the next quarter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollEvent {
    /// Roll day
    pub date: NaiveDate,
    pub outgoing_symbol: String,
    pub outgoing_expiry: NaiveDate,
    pub incoming_symbol: String,
    pub incoming_expiry: NaiveDate,
    /// Outgoing contract's close on the roll day, once known
    pub settlement_price: Option<Decimal>,
}

impl RollEvent {
    /// Attach the outgoing contract's settlement price
    pub fn with_settlement(mut self, price: Decimal) -> Self {
        self.settlement_price = Some(price);
        self
    }
}

/// Days on which a contract's price is needed by a backtest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSegment {
    pub symbol: String,
    pub expiry: NaiveDate,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

/// Picks the active quarterly contract and detects roll days
#[derive(Debug, Clone)]
pub struct RolloverSelector {
    pair: String,
    roll_buffer_days: u32,
    expiries: Vec<NaiveDate>,
}

impl RolloverSelector {
    /// Selector over the expiries of `first_year..=last_year`
    pub fn new(pair: impl Into<String>, roll_buffer_days: u32, first_year: i32, last_year: i32) -> Self {
        Self {
            pair: pair.into(),
            roll_buffer_days,
            expiries: quarterly_expiries(first_year, last_year),
        }
    }

    /// Selector covering every day of `[start, end]`
    ///
    /// Fails up front when no contract would be available on `end`.
    pub fn for_range(
        pair: impl Into<String>,
        roll_buffer_days: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, RollCalendarError> {
        if start > end {
            return Err(RollCalendarError::InvalidRange { start, end });
        }
        let selector = Self::new(pair, roll_buffer_days, start.year(), end.year() + 1);
        selector.active_expiry(end)?;
        Ok(selector)
    }

    /// Symbol family, e.g. `BTCUSD`
    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn roll_buffer_days(&self) -> u32 {
        self.roll_buffer_days
    }

    /// Known expiries, ascending
    pub fn expiries(&self) -> &[NaiveDate] {
        &self.expiries
    }

    fn buffer(&self) -> Duration {
        Duration::days(self.roll_buffer_days as i64)
    }

    /// Nearest expiry strictly after `date + roll_buffer_days`
    pub fn active_expiry(&self, date: NaiveDate) -> Result<NaiveDate, RollCalendarError> {
        let cutoff = date + self.buffer();
        self.expiries
            .iter()
            .copied()
            .find(|expiry| *expiry > cutoff)
            .ok_or(RollCalendarError::NoContractAfter {
                after: cutoff,
                horizon: self.expiries.last().copied(),
            })
    }

    /// Contract to hold on `date`
    pub fn active_contract(&self, date: NaiveDate) -> Result<ActiveContract, RollCalendarError> {
        let expiry = self.active_expiry(date)?;
        Ok(ActiveContract {
            symbol: contract_symbol(&self.pair, expiry),
            expiry,
        })
    }

    /// Whether `date == expiry - roll_buffer_days` for some quarterly expiry
    pub fn is_roll_day(&self, date: NaiveDate) -> bool {
        self.expiries.binary_search(&(date + self.buffer())).is_ok()
    }

    /// Roll event for `date`, if it is a roll day
    pub fn roll_on(&self, date: NaiveDate) -> Result<Option<RollEvent>, RollCalendarError> {
        if !self.is_roll_day(date) {
            return Ok(None);
        }
        let outgoing_expiry = date + self.buffer();
        let incoming = self.active_contract(date)?;
        Ok(Some(RollEvent {
            date,
            outgoing_symbol: contract_symbol(&self.pair, outgoing_expiry),
            outgoing_expiry,
            incoming_symbol: incoming.symbol,
            incoming_expiry: incoming.expiry,
            settlement_price: None,
        }))
    }

    /// Contracts needed to cover `[start, end]` and the days each one is priced
    ///
    /// The outgoing contract of a roll is also priced on the roll day itself,
    /// except when the roll falls on `start` (nothing is held yet).
    pub fn schedule(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ContractSegment>, RollCalendarError> {
        if start > end {
            return Err(RollCalendarError::InvalidRange { start, end });
        }

        let mut segments: Vec<ContractSegment> = Vec::new();
        let mut day = start;
        while day <= end {
            let active = self.active_contract(day)?;
            extend_segment(&mut segments, &active.symbol, active.expiry, day);

            if day > start {
                if let Some(event) = self.roll_on(day)? {
                    extend_segment(&mut segments, &event.outgoing_symbol, event.outgoing_expiry, day);
                }
            }
            day += Duration::days(1);
        }
        Ok(segments)
    }
}

fn extend_segment(segments: &mut Vec<ContractSegment>, symbol: &str, expiry: NaiveDate, day: NaiveDate) {
    match segments.iter_mut().find(|s| s.symbol == symbol) {
        Some(segment) => {
            segment.first_day = segment.first_day.min(day);
            segment.last_day = segment.last_day.max(day);
        }
        None => segments.push(ContractSegment {
            symbol: symbol.to_string(),
            expiry,
            first_day: day,
            last_day: day,
        }),
    }
}
