//! Daily record output
//!
//! Writes backtest records to CSV or Parquet

mod csv;
mod parquet;

pub use self::csv::{read_daily_records_csv, write_daily_records_csv};
pub use self::parquet::{daily_record_schema, read_daily_records_parquet, write_daily_records_parquet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backtest::DailyRecord;

/// Output file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// `backtest_<PAIR>_<start>_<end>.<ext>`
pub fn default_output_name(pair: &str, start: NaiveDate, end: NaiveDate, format: OutputFormat) -> String {
    format!(
        "backtest_{}_{}_{}.{}",
        pair,
        start.format("%Y%m%d"),
        end.format("%Y%m%d"),
        format.extension()
    )
}

/// Keep a path naming a file; join the default name onto a directory
pub fn resolve_output_path(
    path: &Path,
    pair: &str,
    start: NaiveDate,
    end: NaiveDate,
    format: OutputFormat,
) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.join(default_output_name(pair, start, end, format))
    }
}

/// Write records to `path`, creating parent directories
pub fn write_records(path: &Path, records: &[DailyRecord], format: OutputFormat) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    match format {
        OutputFormat::Csv => write_daily_records_csv(path, records)?,
        OutputFormat::Parquet => write_daily_records_parquet(path, records)?,
    }

    tracing::info!(path = ?path, count = records.len(), format = %format, "Wrote daily records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_output_name() {
        let name = default_output_name("BTCUSD", date(2021, 1, 1), date(2021, 12, 31), OutputFormat::Csv);
        assert_eq!(name, "backtest_BTCUSD_20210101_20211231.csv");
    }

    #[test]
    fn test_resolve_output_path() {
        let start = date(2021, 1, 1);
        let end = date(2021, 6, 30);

        let file = resolve_output_path(Path::new("out/run.csv"), "BTCUSD", start, end, OutputFormat::Csv);
        assert_eq!(file, PathBuf::from("out/run.csv"));

        let dir = resolve_output_path(Path::new("out"), "BTCUSD", start, end, OutputFormat::Parquet);
        assert_eq!(dir, PathBuf::from("out/backtest_BTCUSD_20210101_20210630.parquet"));
    }

    #[test]
    fn test_output_format_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: OutputFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"parquet\"").unwrap();
        assert_eq!(parsed.format, OutputFormat::Parquet);
        assert_eq!(OutputFormat::default(), OutputFormat::Csv);
    }
}
