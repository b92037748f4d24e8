use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Canonical column names of the transaction data set
// ---------------------------------------------------------------------------

pub mod columns {
    pub const TIMESTAMP: &str = "Timestamp";
    pub const AMOUNT: &str = "Transaction_Amount_USD";
    pub const CONFUSION: &str = "confusion_value";
    pub const BIAS: &str = "Bias";
    pub const GENDER: &str = "Gender";
    pub const RACE: &str = "Race";
    pub const STATE: &str = "State";
    /// Produced by `clean()` from `Timestamp`.
    pub const DATE: &str = "date";
}

// ---------------------------------------------------------------------------
// ConfusionLabel – classification outcome of one transaction
// ---------------------------------------------------------------------------

/// Outcome of the fraud model's block decision for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfusionLabel {
    /// Correctly blocked.
    TP,
    /// Incorrectly blocked.
    FP,
    /// Correctly allowed.
    TN,
    /// Incorrectly allowed.
    FN,
}

impl ConfusionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfusionLabel::TP => "TP",
            ConfusionLabel::FP => "FP",
            ConfusionLabel::TN => "TN",
            ConfusionLabel::FN => "FN",
        }
    }

    /// Whether a block action was taken on the transaction.
    pub fn is_blocked(&self) -> bool {
        matches!(self, ConfusionLabel::TP | ConfusionLabel::FP)
    }
}

impl FromStr for ConfusionLabel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "TP" => Ok(ConfusionLabel::TP),
            "FP" => Ok(ConfusionLabel::FP),
            "TN" => Ok(ConfusionLabel::TN),
            "FN" => Ok(ConfusionLabel::FN),
            other => Err(format!("unknown confusion label '{other}'")),
        }
    }
}

impl fmt::Display for ConfusionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CellValue – a single cell of the record set
// ---------------------------------------------------------------------------

/// A dynamically-typed cell. Canonical columns are coerced to their typed
/// variants by the loader; other columns keep whatever was guessed.
#[derive(Debug, Clone)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Label(ConfusionLabel),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

// -- Manual Eq/Ord so cells can live in a BTreeSet --
// Equality, ordering and hashing all compare floats by bit pattern.

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                CellValue::Null => 0,
                CellValue::Bool(_) => 1,
                CellValue::Integer(_) => 2,
                CellValue::Float(_) => 3,
                CellValue::Decimal(_) => 4,
                CellValue::Text(_) => 5,
                CellValue::Label(_) => 6,
                CellValue::Timestamp(_) => 7,
                CellValue::Date(_) => 8,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Integer(a), CellValue::Integer(b)) => a.cmp(b),
            (CellValue::Float(a), CellValue::Float(b)) => a.total_cmp(b),
            (CellValue::Decimal(a), CellValue::Decimal(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            (CellValue::Label(a), CellValue::Label(b)) => a.cmp(b),
            (CellValue::Timestamp(a), CellValue::Timestamp(b)) => a.cmp(b),
            (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Null => {}
            CellValue::Bool(b) => b.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Decimal(d) => d.hash(state),
            CellValue::Text(s) => s.hash(state),
            CellValue::Label(l) => l.hash(state),
            CellValue::Timestamp(t) => t.hash(state),
            CellValue::Date(d) => d.hash(state),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "<null>"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Decimal(d) => write!(f, "{d}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Label(l) => write!(f, "{l}"),
            CellValue::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            CellValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<ConfusionLabel> {
        match self {
            CellValue::Label(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Numeric cells as an exact decimal. Floats go through their shortest
    /// round-trip representation so `10.1` stays `10.1`.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            CellValue::Decimal(d) => Some(*d),
            CellValue::Integer(i) => Some(Decimal::from(*i)),
            CellValue::Float(f) if f.is_finite() => Decimal::from_str(&f.to_string())
                .ok()
                .or_else(|| Decimal::try_from(*f).ok()),
            _ => None,
        }
    }
}

/// Parse the timestamp spellings found in exported transaction data.
/// A bare date is read as midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        // Keep the wall-clock time; the offset is not applied.
        return Some(dt.naive_local());
    }
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// RecordSet – the working table of transactions
// ---------------------------------------------------------------------------

/// One row; cells are positional and aligned with [`RecordSet::columns`].
pub type Row = Vec<CellValue>;

/// An ordered table of transaction rows sharing one schema.
///
/// `Clone` yields a fully independent copy, which is how every pipeline stage
/// takes ownership of its input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RecordSet {
    /// An empty record set with the given schema.
    pub fn new(columns: Vec<String>) -> Self {
        RecordSet {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a record set, checking every row matches the schema width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        let mut set = RecordSet::new(columns);
        set.rows.reserve(rows.len());
        for row in rows {
            set.push_row(row)?;
        }
        Ok(set)
    }

    pub fn push_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::validation(format!(
                "row {} has {} cells but the schema has {} columns",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Ordered column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Position of a column, or a schema error naming it.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PipelineError::schema(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Keep only the rows for which `keep` returns true, preserving order.
    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(keep);
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    /// Remove every column that holds at least one null cell.
    /// Returns the names of the dropped columns.
    pub fn drop_columns_with_nulls(&mut self) -> Vec<String> {
        let keep: Vec<bool> = (0..self.columns.len())
            .map(|idx| self.rows.iter().all(|row| !row[idx].is_null()))
            .collect();

        let dropped: Vec<String> = self
            .columns
            .iter()
            .zip(&keep)
            .filter(|(_, k)| !**k)
            .map(|(c, _)| c.clone())
            .collect();
        if dropped.is_empty() {
            return dropped;
        }

        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
        dropped
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        let idx = self.column_index(from)?;
        self.columns[idx] = to.to_string();
        Ok(())
    }

    /// Sorted set of the distinct non-null values of a column.
    pub fn distinct_values(&self, column: &str) -> Result<BTreeSet<CellValue>> {
        let idx = self.column_index(column)?;
        Ok(self
            .rows
            .iter()
            .map(|row| &row[idx])
            .filter(|v| !v.is_null())
            .cloned()
            .collect())
    }
}
