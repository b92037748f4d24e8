//! Validated (date, metric) series, the unit handed from the aggregator to
//! the formatters and the forecaster.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::data::model::{CellValue, RecordSet, columns};
use crate::error::{PipelineError, Result};

/// The metric carried in a series' second column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Number of transactions per day.
    Frequency,
    /// Sum of transaction amounts per day.
    Revenue,
}

impl Metric {
    /// Column name of the metric.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Frequency => "frequency",
            Metric::Revenue => "revenue",
        }
    }
}

impl FromStr for Metric {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "frequency" => Ok(Metric::Frequency),
            "revenue" => Ok(Metric::Revenue),
            other => Err(PipelineError::validation(format!(
                "second column must be 'frequency' or 'revenue', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// A read-only two-column table: `date` and one [`Metric`].
///
/// The only ways in are the validating constructors, so every instance has
/// exactly two columns, a known metric, date cells in the first column and
/// (for frequency) non-negative whole counts in the second.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    metric: Metric,
    points: Vec<SeriesPoint>,
}

impl MetricSeries {
    /// Build a series from a two-column record set `date, <metric>`.
    pub fn from_records(records: RecordSet) -> Result<Self> {
        let cols = records.columns();
        if cols.len() != 2 {
            return Err(PipelineError::validation(format!(
                "series data must have exactly 2 columns, got {}",
                cols.len()
            )));
        }
        if cols[0] != columns::DATE {
            return Err(PipelineError::validation(format!(
                "first column must be '{}', got '{}'",
                columns::DATE,
                cols[0]
            )));
        }
        let metric: Metric = cols[1].parse()?;

        let points = records
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let date = row[0].as_date().ok_or_else(|| {
                    PipelineError::validation(format!("row {i}: '{}' is not a date", row[0]))
                })?;
                let value = match (&row[1], metric) {
                    (CellValue::Integer(n), Metric::Frequency) => Decimal::from(*n),
                    (cell, Metric::Revenue) => cell.as_decimal().ok_or_else(|| {
                        PipelineError::validation(format!("row {i}: '{cell}' is not an amount"))
                    })?,
                    (cell, Metric::Frequency) => {
                        return Err(PipelineError::validation(format!(
                            "row {i}: '{cell}' is not a count"
                        )))
                    }
                };
                Ok(SeriesPoint { date, value })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_points(metric, points)
    }

    /// Build a series directly from points.
    pub fn from_points(metric: Metric, points: Vec<SeriesPoint>) -> Result<Self> {
        if metric == Metric::Frequency {
            if let Some(bad) = points
                .iter()
                .find(|p| p.value.is_sign_negative() || !p.value.fract().is_zero())
            {
                return Err(PipelineError::validation(format!(
                    "frequency on {} must be a non-negative whole count, got {}",
                    bad.date, bad.value
                )));
            }
        }
        Ok(MetricSeries { metric, points })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// The stored rows, in order.
    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of the metric over all rows.
    pub fn total(&self) -> Result<Decimal> {
        self.points.iter().try_fold(Decimal::ZERO, |acc, p| {
            acc.checked_add(p.value).ok_or_else(|| {
                PipelineError::validation(format!("{} total overflows at {}", self.metric, p.date))
            })
        })
    }

    /// Earliest and latest date, if any.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.points.iter().map(|p| p.date).min()?;
        let max = self.points.iter().map(|p| p.date).max()?;
        Some((min, max))
    }

    /// The series as a two-column record set, the inverse of
    /// [`MetricSeries::from_records`].
    pub fn to_records(&self) -> RecordSet {
        let rows = self
            .points
            .iter()
            .map(|p| {
                let value = match self.metric {
                    Metric::Frequency => p
                        .value
                        .to_i64()
                        .map(CellValue::Integer)
                        .unwrap_or(CellValue::Decimal(p.value)),
                    Metric::Revenue => CellValue::Decimal(p.value),
                };
                vec![CellValue::Date(p.date), value]
            })
            .collect();
        // Two cells per row against a two-column schema.
        RecordSet::from_rows(
            vec![columns::DATE.to_string(), self.metric.name().to_string()],
            rows,
        )
        .unwrap_or_default()
    }
}
