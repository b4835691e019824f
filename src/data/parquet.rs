//! Parquet daily record sink

use arrow::array::{Array, ArrayRef, BooleanArray, Date32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::backtest::DailyRecord;

const DECIMAL_COLUMNS: [&str; 7] = [
    "spot_price",
    "futures_price",
    "spot_pnl",
    "futures_pnl",
    "cumulative_pnl",
    "spot_quantity",
    "future_contracts",
];

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Daily record schema
pub fn daily_record_schema() -> Schema {
    Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("spot_price", DataType::Utf8, false), // Store as string for Decimal precision
        Field::new("futures_price", DataType::Utf8, false),
        Field::new("spot_pnl", DataType::Utf8, false),
        Field::new("futures_pnl", DataType::Utf8, false),
        Field::new("cumulative_pnl", DataType::Utf8, false),
        Field::new("active_future_symbol", DataType::Utf8, false),
        Field::new("spot_quantity", DataType::Utf8, false),
        Field::new("future_contracts", DataType::Utf8, false),
        Field::new("roll", DataType::Boolean, false),
    ])
}

fn decimal_column(records: &[DailyRecord], value: impl Fn(&DailyRecord) -> Decimal) -> ArrayRef {
    let values: Vec<String> = records.iter().map(|r| value(r).to_string()).collect();
    Arc::new(StringArray::from(values))
}

/// Write records to a single Parquet file
pub fn write_daily_records_parquet(path: &Path, records: &[DailyRecord]) -> anyhow::Result<()> {
    let schema = Arc::new(daily_record_schema());
    let file = File::create(path)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let dates: Vec<i32> = records
        .iter()
        .map(|r| (r.date - epoch()).num_days() as i32)
        .collect();
    let symbols: Vec<&str> = records.iter().map(|r| r.active_future_symbol.as_str()).collect();
    let rolls: Vec<bool> = records.iter().map(|r| r.roll).collect();

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Date32Array::from(dates)) as ArrayRef,
            decimal_column(records, |r| r.spot_price),
            decimal_column(records, |r| r.futures_price),
            decimal_column(records, |r| r.spot_pnl),
            decimal_column(records, |r| r.futures_pnl),
            decimal_column(records, |r| r.cumulative_pnl),
            Arc::new(StringArray::from(symbols)) as ArrayRef,
            decimal_column(records, |r| r.spot_quantity),
            decimal_column(records, |r| r.future_contracts),
            Arc::new(BooleanArray::from(rolls)) as ArrayRef,
        ],
    )?;

    writer.write(&batch)?;
    writer.close()?;

    tracing::debug!(path = ?path, count = records.len(), "Wrote daily records to Parquet");

    Ok(())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
}

/// Read records written by [`write_daily_records_parquet`]
pub fn read_daily_records_parquet(path: &Path) -> anyhow::Result<Vec<DailyRecord>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    for batch_result in reader {
        let batch = batch_result?;

        let dates = batch
            .column_by_name("date")
            .and_then(|c| c.as_any().downcast_ref::<Date32Array>())
            .ok_or_else(|| anyhow::anyhow!("Invalid date column"))?;
        let rolls = batch
            .column_by_name("roll")
            .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
            .ok_or_else(|| anyhow::anyhow!("Invalid roll column"))?;
        let symbols = string_column(&batch, "active_future_symbol")?;
        let decimals = DECIMAL_COLUMNS
            .iter()
            .map(|name| string_column(&batch, name))
            .collect::<anyhow::Result<Vec<_>>>()?;

        for i in 0..batch.num_rows() {
            let d = |col: usize| Decimal::from_str(decimals[col].value(i));
            records.push(DailyRecord {
                date: epoch() + Duration::days(dates.value(i) as i64),
                spot_price: d(0)?,
                futures_price: d(1)?,
                spot_pnl: d(2)?,
                futures_pnl: d(3)?,
                cumulative_pnl: d(4)?,
                active_future_symbol: symbols.value(i).to_string(),
                spot_quantity: d(5)?,
                future_contracts: d(6)?,
                roll: rolls.value(i),
            });
        }
    }

    Ok(records)
}
