//! Daily aggregation of cleaned transactions.
//!
//! Input must have been through `RecordTransformer::clean`, i.e. carry a
//! `date` column of calendar dates. Output series are sparse: only dates
//! with at least one transaction appear, in ascending order.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;

use crate::data::model::{CellValue, RecordSet, columns};
use crate::error::{PipelineError, Result};
use crate::series::{Metric, MetricSeries};

/// Group by `date` and return the `(frequency, revenue)` series.
pub fn aggregate(records: &RecordSet) -> Result<(MetricSeries, MetricSeries)> {
    let frequency = frequency(records)?;
    let revenue = revenue(records)?;
    Ok((frequency, revenue))
}

/// Number of rows per date.
pub fn frequency(records: &RecordSet) -> Result<MetricSeries> {
    let mut counts: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for date in dates(records)? {
        *counts.entry(date?).or_default() += 1;
    }
    build(
        Metric::Frequency,
        counts.into_iter().map(|(d, n)| (d, CellValue::Integer(n))),
    )
}

/// Sum of `Transaction_Amount_USD` per date.
pub fn revenue(records: &RecordSet) -> Result<MetricSeries> {
    let amount_idx = records.column_index(columns::AMOUNT)?;
    let mut sums: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for (row_no, (date, row)) in dates(records)?.zip(records.rows()).enumerate() {
        let amount = row[amount_idx].as_decimal().ok_or_else(|| {
            PipelineError::invalid_cell(
                row_no,
                columns::AMOUNT,
                format!("'{}' is not an amount", row[amount_idx]),
            )
        })?;
        let date = date?;
        let sum = sums.entry(date).or_default();
        *sum = sum.checked_add(amount).ok_or_else(|| {
            PipelineError::invalid_cell(
                row_no,
                columns::AMOUNT,
                format!("revenue on {date} overflows"),
            )
        })?;
    }
    build(
        Metric::Revenue,
        sums.into_iter().map(|(d, s)| (d, CellValue::Decimal(s))),
    )
}

fn dates(records: &RecordSet) -> Result<impl Iterator<Item = Result<NaiveDate>> + '_> {
    let date_idx = records.column_index(columns::DATE)?;
    Ok(records.rows().iter().enumerate().map(move |(row_no, row)| {
        row[date_idx].as_date().ok_or_else(|| {
            PipelineError::invalid_cell(
                row_no,
                columns::DATE,
                format!("'{}' is not a date", row[date_idx]),
            )
        })
    }))
}

/// Route grouped values through the validating series constructor.
fn build(
    metric: Metric,
    grouped: impl Iterator<Item = (NaiveDate, CellValue)>,
) -> Result<MetricSeries> {
    let rows = grouped.map(|(d, v)| vec![CellValue::Date(d), v]).collect();
    let table = RecordSet::from_rows(
        vec![columns::DATE.to_string(), metric.name().to_string()],
        rows,
    )?;
    let series = MetricSeries::from_records(table)?;
    debug!("aggregated {} series over {} dates", metric, series.len());
    Ok(series)
}
