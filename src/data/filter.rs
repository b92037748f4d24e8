use log::debug;

use super::model::{CellValue, RecordSet, columns};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Attribute filters
// ---------------------------------------------------------------------------

/// A demographic filter. `None` means "no filter" and passes every row.
///
/// New attributes are added as variants here; [`FilterManager`] only sees
/// [`AttributeFilter::column`] and [`AttributeFilter::value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeFilter {
    Gender(Option<String>),
    Race(Option<String>),
}

impl AttributeFilter {
    /// Column the filter matches against.
    pub fn column(&self) -> &'static str {
        match self {
            AttributeFilter::Gender(_) => columns::GENDER,
            AttributeFilter::Race(_) => columns::RACE,
        }
    }

    /// Value to match, if the filter is active.
    pub fn value(&self) -> Option<&str> {
        match self {
            AttributeFilter::Gender(v) | AttributeFilter::Race(v) => v.as_deref(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.value().is_some()
    }
}

// ---------------------------------------------------------------------------
// FilterManager
// ---------------------------------------------------------------------------

/// Applies an ordered set of attribute filters, combined with logical AND.
#[derive(Debug, Clone, Default)]
pub struct FilterManager {
    filters: Vec<AttributeFilter>,
}

impl FilterManager {
    pub fn new(filters: Vec<AttributeFilter>) -> Self {
        FilterManager { filters }
    }

    pub fn filters(&self) -> &[AttributeFilter] {
        &self.filters
    }

    /// Return a new record set holding the rows that pass all active filters,
    /// in their original order. The input is left untouched.
    ///
    /// A row passes an active filter when its cell in the filter's column is
    /// text equal to the filter value; null cells never pass. An active
    /// filter whose column is missing is a schema error.
    pub fn apply(&self, records: &RecordSet) -> Result<RecordSet> {
        let active: Vec<(usize, &str)> = self
            .filters
            .iter()
            .filter_map(|f| f.value().map(|v| (f.column(), v)))
            .map(|(col, v)| records.column_index(col).map(|idx| (idx, v)))
            .collect::<Result<_>>()?;

        let mut filtered = records.clone();
        if active.is_empty() {
            return Ok(filtered);
        }

        filtered.retain_rows(|row| {
            active
                .iter()
                .all(|(idx, wanted)| matches!(&row[*idx], CellValue::Text(s) if s.as_str() == *wanted))
        });
        debug!(
            "attribute filters kept {} of {} rows",
            filtered.len(),
            records.len()
        );
        Ok(filtered)
    }
}
