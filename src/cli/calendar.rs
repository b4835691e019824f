//! Calendar command implementation

use chrono::NaiveDate;
use clap::Args;

use crate::config::Config;
use crate::rollover::{contract_symbol, RolloverSelector};

#[derive(Args, Debug)]
pub struct CalendarArgs {
    /// First day (YYYY-MM-DD), defaults to the backtest start
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD), defaults to the backtest end
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Days before expiry to roll
    #[arg(long)]
    pub buffer: Option<u32>,
}

impl CalendarArgs {
    /// Expiry / roll-day lines for the range
    pub fn render(&self, config: &Config) -> anyhow::Result<Vec<String>> {
        let start = self.start.unwrap_or(config.backtest.start_date);
        let end = self.end.unwrap_or(config.backtest.end_date);
        let buffer = self.buffer.unwrap_or(config.backtest.roll_buffer_days);
        let pair = &config.backtest.future_pair;

        let selector = RolloverSelector::for_range(pair, buffer, start, end)?;
        let mut lines = vec![format!("{:<16} {:<12} {:<12}", "CONTRACT", "EXPIRY", "ROLL DAY")];
        for expiry in selector.expiries() {
            let roll_day = *expiry - chrono::Duration::days(buffer as i64);
            if roll_day < start {
                continue;
            }
            lines.push(format!(
                "{:<16} {:<12} {:<12}",
                contract_symbol(pair, *expiry),
                expiry,
                roll_day
            ));
            if roll_day > end {
                break;
            }
        }
        Ok(lines)
    }

    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        for line in self.render(config)? {
            println!("{}", line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_2021() {
        let args = CalendarArgs {
            start: NaiveDate::from_ymd_opt(2021, 1, 1),
            end: NaiveDate::from_ymd_opt(2021, 12, 31),
            buffer: None,
        };
        let lines = args.render(&Config::default()).unwrap();

        assert!(lines[0].starts_with("CONTRACT"));
        assert!(lines[1].starts_with("BTCUSD_210326"));
        assert!(lines[1].contains("2021-03-25"));
        assert!(lines[4].starts_with("BTCUSD_211231"));
        // First quarter whose roll falls after the range
        assert!(lines[5].starts_with("BTCUSD_220325"));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_render_rejects_inverted_range() {
        let args = CalendarArgs {
            start: NaiveDate::from_ymd_opt(2021, 6, 1),
            end: NaiveDate::from_ymd_opt(2021, 1, 1),
            buffer: Some(1),
        };
        assert!(args.render(&Config::default()).is_err());
    }
}
