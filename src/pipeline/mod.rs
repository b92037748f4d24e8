//! The transformation pipeline from raw transactions to series.
//!
//! ```text
//!  RecordSet ─► RecordTransformer ─► aggregate ─► MetricSeries ─► format
//!              (filter_by, unbias,   (per date)    (validated)    ├─ display records
//!               filter_invalid,                                   └─ dense series ─► Forecaster
//!               clean)
//! ```

pub mod aggregate;
pub mod format;
pub mod transformer;
