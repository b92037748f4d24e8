//! Output shaping for aggregated series.
//!
//! * display: flat `{"date": "YYYY-MM-DD", "<metric>": value}` records
//! * predicting: dense, date-indexed series with zero-filled gaps

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{PipelineError, Result};
use crate::forecast::ForecastPoint;
use crate::series::{Metric, MetricSeries};

/// Date format used in every JSON record.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One flat JSON record.
pub type DisplayRecord = Map<String, Value>;

/// Past frequency and revenue, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayData {
    pub frequency: Vec<DisplayRecord>,
    pub revenue: Vec<DisplayRecord>,
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

pub fn for_display(frequency: &MetricSeries, revenue: &MetricSeries) -> DisplayData {
    DisplayData {
        frequency: display_records(frequency),
        revenue: display_records(revenue),
    }
}

/// Convert a series to one record per row, in series order.
pub fn display_records(series: &MetricSeries) -> Vec<DisplayRecord> {
    let metric = series.metric();
    series
        .points()
        .iter()
        .map(|p| record(p.date, metric, metric_value(metric, p.value)))
        .collect()
}

/// Forecast points in the same record shape as past data.
pub fn forecast_records(metric: Metric, points: &[ForecastPoint]) -> Vec<DisplayRecord> {
    points
        .iter()
        .map(|p| record(p.date, metric, float_value(p.value)))
        .collect()
}

fn record(date: NaiveDate, metric: Metric, value: Value) -> DisplayRecord {
    let mut rec = Map::new();
    rec.insert("date".to_string(), Value::String(date.format(DATE_FORMAT).to_string()));
    rec.insert(metric.name().to_string(), value);
    rec
}

/// Counts serialize as integers, amounts as JSON numbers.
fn metric_value(metric: Metric, value: Decimal) -> Value {
    match (metric, value.to_i64()) {
        (Metric::Frequency, Some(n)) => Value::from(n),
        _ => float_value(value.to_f64().unwrap_or(f64::NAN)),
    }
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Predicting
// ---------------------------------------------------------------------------

/// A gap-free daily series keyed by date.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseSeries {
    metric: Metric,
    values: BTreeMap<NaiveDate, Decimal>,
}

impl DenseSeries {
    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn values(&self) -> &BTreeMap<NaiveDate, Decimal> {
        &self.values
    }

    pub fn get(&self, date: NaiveDate) -> Option<Decimal> {
        self.values.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.values.keys().next_back().copied()
    }

    /// Values in date order as floats, the usual forecaster input.
    pub fn to_f64(&self) -> Vec<f64> {
        self.values
            .values()
            .map(|v| v.to_f64().unwrap_or(0.0))
            .collect()
    }
}

pub fn for_predicting(
    frequency: &MetricSeries,
    revenue: &MetricSeries,
) -> Result<(DenseSeries, DenseSeries)> {
    Ok((gap_fill(frequency)?, gap_fill(revenue)?))
}

/// Re-index a sparse series over every day from its first to its last date,
/// inclusive, with 0 on days that had no rows. An empty series stays empty.
pub fn gap_fill(series: &MetricSeries) -> Result<DenseSeries> {
    let mut values = BTreeMap::new();
    if let Some((first, last)) = series.date_range() {
        for day in first.iter_days().take_while(|d| *d <= last) {
            values.insert(day, Decimal::ZERO);
        }
        for p in series.points() {
            let slot = values.entry(p.date).or_default();
            *slot = slot.checked_add(p.value).ok_or_else(|| {
                PipelineError::validation(format!("{} on {} overflows", series.metric(), p.date))
            })?;
        }
    }
    Ok(DenseSeries {
        metric: series.metric(),
        values,
    })
}
