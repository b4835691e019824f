//! CSV daily record sink

use std::path::Path;

use crate::backtest::DailyRecord;

/// Decimal places kept for P&L and quantity columns
const PNL_DP: u32 = 8;

fn rounded(record: &DailyRecord) -> DailyRecord {
    DailyRecord {
        spot_pnl: record.spot_pnl.round_dp(PNL_DP),
        futures_pnl: record.futures_pnl.round_dp(PNL_DP),
        cumulative_pnl: record.cumulative_pnl.round_dp(PNL_DP),
        spot_quantity: record.spot_quantity.round_dp(PNL_DP),
        ..record.clone()
    }
}

/// Write records with a header row, one row per day
pub fn write_daily_records_csv(path: &Path, records: &[DailyRecord]) -> anyhow::Result<()> {
    let mut writer = ::csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(rounded(record))?;
    }
    writer.flush()?;

    tracing::debug!(path = ?path, count = records.len(), "Wrote daily records to CSV");
    Ok(())
}

/// Read records written by [`write_daily_records_csv`]
pub fn read_daily_records_csv(path: &Path) -> anyhow::Result<Vec<DailyRecord>> {
    let mut reader = ::csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<Result<Vec<DailyRecord>, _>>()?;
    Ok(records)
}
