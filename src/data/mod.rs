/// Data layer: core types, loading, and filtering.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RecordSet, coerce canonical columns
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ RecordSet │  ordered columns, positional rows of CellValue
///   └───────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  demographic predicates → new RecordSet
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod filter;
