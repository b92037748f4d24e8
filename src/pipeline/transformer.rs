use log::{debug, warn};

use super::aggregate;
use super::format::{self, DenseSeries, DisplayData};
use crate::data::filter::{AttributeFilter, FilterManager};
use crate::data::model::{CellValue, ConfusionLabel, RecordSet, columns, parse_timestamp};
use crate::error::{PipelineError, Result};
use crate::series::MetricSeries;

/// Fluent pipeline over one owned copy of a record set.
///
/// Every step consumes the transformer and hands back a new one, so a
/// caller can never hold a stale handle whose contents a later step has
/// rewritten:
///
/// ```ignore
/// let revenue = RecordTransformer::new(&records)
///     .filter_by(Some("Female"), None, None)?
///     .unbias()?
///     .filter_invalid_transactions()?
///     .revenue_series()?;
/// ```
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    records: RecordSet,
}

impl RecordTransformer {
    /// Start a pipeline on a private copy of `records`.
    pub fn new(records: &RecordSet) -> Self {
        Self::from_owned(records.clone())
    }

    pub fn from_owned(records: RecordSet) -> Self {
        RecordTransformer { records }
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn into_records(self) -> RecordSet {
        self.records
    }

    /// Reinterpret biased false positives: every row labelled `FP` with
    /// `Bias == 1` becomes `TN` with `Bias == 0`. Other rows are unchanged.
    pub fn unbias(mut self) -> Result<Self> {
        let label_idx = self.records.column_index(columns::CONFUSION)?;
        let bias_idx = self.records.column_index(columns::BIAS)?;

        let mut flipped = 0usize;
        for row in self.records.rows_mut() {
            let biased_fp = row[label_idx] == CellValue::Label(ConfusionLabel::FP)
                && row[bias_idx].as_integer() == Some(1);
            if biased_fp {
                row[label_idx] = CellValue::Label(ConfusionLabel::TN);
                row[bias_idx] = CellValue::Integer(0);
                flipped += 1;
            }
        }
        debug!("unbias: relabelled {flipped} biased false positives");
        Ok(self)
    }

    /// Keep rows matching the gender and race filters; `None` disables a filter.
    ///
    /// `state` is accepted but not applied yet: the attribute it should match
    /// has not been settled.
    pub fn filter_by(
        self,
        gender: Option<&str>,
        race: Option<&str>,
        state: Option<&str>,
    ) -> Result<Self> {
        if let Some(state) = state {
            warn!("filter_by: state filter '{state}' is not supported and was ignored");
        }
        let manager = FilterManager::new(vec![
            AttributeFilter::Gender(gender.map(str::to_string)),
            AttributeFilter::Race(race.map(str::to_string)),
        ]);
        let records = manager.apply(&self.records)?;
        Ok(Self::from_owned(records))
    }

    /// Drop every transaction that was blocked (`TP` or `FP`).
    pub fn filter_invalid_transactions(mut self) -> Result<Self> {
        let label_idx = self.records.column_index(columns::CONFUSION)?;
        let before = self.records.len();
        self.records.retain_rows(|row| {
            !row[label_idx]
                .as_label()
                .is_some_and(|label| label.is_blocked())
        });
        debug!(
            "filter_invalid_transactions: kept {} of {before} rows",
            self.records.len()
        );
        Ok(self)
    }

    /// Prepare the set for aggregation.
    ///
    /// When a `Timestamp` column is present: drop every column that holds a
    /// missing value, truncate `Timestamp` to a calendar date and rename it
    /// to `date`. Without a `Timestamp` column this does nothing, so calling
    /// it again after a successful clean is a no-op.
    pub fn clean(mut self) -> Result<Self> {
        if !self.records.has_column(columns::TIMESTAMP) {
            return Ok(self);
        }
        if self.records.has_column(columns::DATE) {
            return Err(PipelineError::validation(format!(
                "cannot derive '{}': the column already exists",
                columns::DATE
            )));
        }

        let dropped = self.records.drop_columns_with_nulls();
        if !dropped.is_empty() {
            debug!("clean: dropped columns with missing values: {dropped:?}");
        }

        // A Timestamp column with gaps was dropped above.
        let ts_idx = self.records.column_index(columns::TIMESTAMP)?;
        for (row_no, row) in self.records.rows_mut().iter_mut().enumerate() {
            let date = match &row[ts_idx] {
                CellValue::Timestamp(t) => t.date(),
                CellValue::Date(d) => *d,
                CellValue::Text(s) => parse_timestamp(s).map(|t| t.date()).ok_or_else(|| {
                    PipelineError::invalid_cell(
                        row_no,
                        columns::TIMESTAMP,
                        format!("'{s}' is not a timestamp"),
                    )
                })?,
                other => {
                    return Err(PipelineError::invalid_cell(
                        row_no,
                        columns::TIMESTAMP,
                        format!("'{other}' is not a timestamp"),
                    ))
                }
            };
            row[ts_idx] = CellValue::Date(date);
        }
        self.records.rename_column(columns::TIMESTAMP, columns::DATE)?;
        Ok(self)
    }

    /// Clean, then count transactions per day.
    pub fn frequency_series(self) -> Result<MetricSeries> {
        aggregate::frequency(self.clean()?.records())
    }

    /// Clean, then sum transaction amounts per day.
    pub fn revenue_series(self) -> Result<MetricSeries> {
        aggregate::revenue(self.clean()?.records())
    }

    /// Clean, aggregate and format both series as JSON-ready records.
    pub fn for_display(self) -> Result<DisplayData> {
        let (frequency, revenue) = aggregate::aggregate(self.clean()?.records())?;
        Ok(format::for_display(&frequency, &revenue))
    }

    /// Clean, aggregate and gap-fill both series for a forecaster.
    pub fn for_predicting(self) -> Result<(DenseSeries, DenseSeries)> {
        let (frequency, revenue) = aggregate::aggregate(self.clean()?.records())?;
        format::for_predicting(&frequency, &revenue)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    fn ts(day: u32, hour: u32) -> CellValue {
        CellValue::Timestamp(
            NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
    }

    fn label(l: ConfusionLabel) -> CellValue {
        CellValue::Label(l)
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn row(
        day: u32,
        hour: u32,
        amount: i64,
        l: ConfusionLabel,
        bias: i64,
        who: [&str; 2],
        state: Option<&str>,
    ) -> Vec<CellValue> {
        vec![
            ts(day, hour),
            CellValue::Decimal(Decimal::from(amount)),
            label(l),
            CellValue::Integer(bias),
            text(who[0]),
            text(who[1]),
            state.map_or(CellValue::Null, text),
        ]
    }

    fn transactions() -> RecordSet {
        use ConfusionLabel::*;
        RecordSet::from_rows(
            vec![
                columns::TIMESTAMP.into(),
                columns::AMOUNT.into(),
                columns::CONFUSION.into(),
                columns::BIAS.into(),
                columns::GENDER.into(),
                columns::RACE.into(),
                columns::STATE.into(),
            ],
            vec![
                row(1, 9, 10, TP, 0, ["Female", "Asian"], Some("CA")),
                row(1, 17, 5, FP, 1, ["Male", "Black"], None),
                row(3, 8, 20, TN, 0, ["Female", "White"], Some("NY")),
                row(4, 12, 7, FP, 0, ["Female", "Asian"], Some("TX")),
            ],
        )
        .unwrap()
    }

    fn labels(set: &RecordSet) -> Vec<ConfusionLabel> {
        let idx = set.column_index(columns::CONFUSION).unwrap();
        set.rows().iter().filter_map(|r| r[idx].as_label()).collect()
    }

    #[test]
    fn test_unbias_flips_only_biased_false_positives() {
        let out = RecordTransformer::new(&transactions()).unbias().unwrap();
        let set = out.records();

        assert_eq!(
            labels(set),
            vec![ConfusionLabel::TP, ConfusionLabel::TN, ConfusionLabel::TN, ConfusionLabel::FP]
        );
        assert_eq!(set.value(1, columns::BIAS), Some(&CellValue::Integer(0)));
        // FP without the bias flag is left alone.
        assert_eq!(set.value(3, columns::CONFUSION), Some(&label(ConfusionLabel::FP)));

        let biased_fp = set.rows().iter().any(|r| {
            r[2] == label(ConfusionLabel::FP) && r[3] == CellValue::Integer(1)
        });
        assert!(!biased_fp);
    }

    #[test]
    fn test_unbias_is_idempotent() {
        let once = RecordTransformer::new(&transactions()).unbias().unwrap();
        let twice = once.clone().unbias().unwrap();
        assert_eq!(once.records(), twice.records());
    }

    #[test]
    fn test_unbias_requires_columns() {
        let set = RecordSet::from_rows(
            vec![columns::CONFUSION.into()],
            vec![vec![label(ConfusionLabel::FP)]],
        )
        .unwrap();
        match RecordTransformer::new(&set).unbias() {
            Err(PipelineError::Schema(col)) => assert_eq!(col, columns::BIAS),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_source_is_never_touched() {
        let source = transactions();
        let _ = RecordTransformer::new(&source)
            .unbias()
            .and_then(|t| t.filter_invalid_transactions())
            .and_then(|t| t.clean())
            .unwrap();
        assert_eq!(source, transactions());
    }

    #[test]
    fn test_filter_by_all_none_is_identity() {
        let source = transactions();
        let out = RecordTransformer::new(&source).filter_by(None, None, None).unwrap();
        assert_eq!(out.records(), &source);
    }

    #[test]
    fn test_filter_by_gender_and_race() {
        let out = RecordTransformer::new(&transactions())
            .filter_by(Some("Female"), Some("Asian"), None)
            .unwrap();
        assert_eq!(out.records().len(), 2);
        assert_eq!(labels(out.records()), vec![ConfusionLabel::TP, ConfusionLabel::FP]);
    }

    #[test]
    fn test_filter_by_ignores_state() {
        let out = RecordTransformer::new(&transactions())
            .filter_by(None, None, Some("NY"))
            .unwrap();
        assert_eq!(out.records().len(), 4);
    }

    #[test]
    fn test_filter_invalid_transactions_removes_blocked() {
        let out = RecordTransformer::new(&transactions())
            .filter_invalid_transactions()
            .unwrap();
        assert_eq!(labels(out.records()), vec![ConfusionLabel::TN]);
    }

    #[test]
    fn test_unbias_before_filtering_recovers_biased_rows() {
        let out = RecordTransformer::new(&transactions())
            .unbias()
            .and_then(|t| t.filter_invalid_transactions())
            .unwrap();
        assert_eq!(out.records().len(), 2);
    }

    #[test]
    fn test_clean_drops_columns_with_gaps_and_derives_date() {
        let out = RecordTransformer::new(&transactions()).clean().unwrap();
        let set = out.records();

        assert!(!set.has_column(columns::STATE));
        assert!(!set.has_column(columns::TIMESTAMP));
        assert_eq!(set.columns()[0], columns::DATE);
        assert_eq!(
            set.value(1, columns::DATE),
            Some(&CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()))
        );
    }

    #[test]
    fn test_clean_is_idempotent() {
        let once = RecordTransformer::new(&transactions()).clean().unwrap();
        let twice = once.clone().clean().unwrap();
        assert_eq!(once.records(), twice.records());
    }

    #[test]
    fn test_clean_without_timestamp_is_noop() {
        let set = RecordSet::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![CellValue::Null, CellValue::Integer(1)]],
        )
        .unwrap();
        let out = RecordTransformer::new(&set).clean().unwrap();
        assert_eq!(out.records(), &set);
    }

    #[test]
    fn test_clean_with_gappy_timestamp_is_schema_error() {
        let set = RecordSet::from_rows(
            vec![columns::TIMESTAMP.into()],
            vec![vec![ts(1, 0)], vec![CellValue::Null]],
        )
        .unwrap();
        assert!(matches!(
            RecordTransformer::new(&set).clean(),
            Err(PipelineError::Schema(_))
        ));
    }

    #[test]
    fn test_clean_parses_text_timestamps() {
        let set = RecordSet::from_rows(
            vec![columns::TIMESTAMP.into()],
            vec![vec![text("2024-02-29 23:59:59")]],
        )
        .unwrap();
        let out = RecordTransformer::new(&set).clean().unwrap();
        assert_eq!(
            out.records().value(0, columns::DATE),
            Some(&CellValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
    }

    #[test]
    fn test_series_accessors() {
        let frequency = RecordTransformer::new(&transactions())
            .filter_invalid_transactions()
            .and_then(|t| t.frequency_series())
            .unwrap();
        assert_eq!(frequency.total().unwrap(), Decimal::from(1));

        let revenue = RecordTransformer::new(&transactions()).revenue_series().unwrap();
        assert_eq!(revenue.total().unwrap(), Decimal::from(42));
    }
}
