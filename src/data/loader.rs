use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int32Type, Int64Type, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType,
};
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, ConfusionLabel, RecordSet, Row, columns, parse_timestamp};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a transaction record set from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row with column names, one transaction per line
/// * `.json`    – `[{ "Timestamp": "...", "Transaction_Amount_USD": 12.5, ... }, ...]`
/// * `.parquet` – one column per field (as written by `df.to_parquet()`)
///
/// Canonical columns are coerced to their typed cells after parsing, see
/// [`normalize_columns`].
pub fn load_file(path: &Path) -> Result<RecordSet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    let set = normalize_columns(raw)
        .with_context(|| format!("normalizing columns of {}", path.display()))?;
    info!(
        "loaded {} transactions with {} columns from {}",
        set.len(),
        set.columns().len(),
        path.display()
    );
    Ok(set)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the default `df.to_json(orient='records')`.
/// Columns are ordered by first appearance; a key absent from a record
/// is a null cell.
fn load_json(path: &Path) -> Result<RecordSet> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut headers: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let mut rows = Vec::with_capacity(records.len());
    for rec in records {
        // Checked to be an object above.
        let Some(obj) = rec.as_object() else { continue };
        let row: Row = headers
            .iter()
            .map(|h| obj.get(h).map(json_to_cell).unwrap_or(CellValue::Null))
            .collect();
        rows.push(row);
    }

    Ok(RecordSet::from_rows(headers, rows)?)
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => guess_cell_type(s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> Result<RecordSet> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() != headers.len() {
            bail!(
                "CSV row {row_no}: {} fields but the header has {}",
                record.len(),
                headers.len()
            );
        }
        rows.push(record.iter().map(guess_cell_type).collect());
    }

    Ok(RecordSet::from_rows(headers, rows)?)
}

/// Missing-value spellings follow the pandas defaults that matter in
/// practice for these exports.
fn guess_cell_type(s: &str) -> CellValue {
    let s = s.trim();
    if s.is_empty() || matches!(s, "NA" | "NaN" | "nan" | "null" | "None") {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    CellValue::Text(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one column per field. Works with files written
/// by both **Pandas** (`df.to_parquet()`) and **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<RecordSet> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut set = RecordSet::new(headers);

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            let cells: Row = batch
                .columns()
                .iter()
                .map(|col| extract_cell(col, row))
                .collect();
            set.push_row(cells)?;
        }
    }

    Ok(set)
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &Arc<dyn Array>, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => guess_cell_type(col.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => guess_cell_type(col.as_string::<i64>().value(row)),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => CellValue::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => CellValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        DataType::Date32 => col
            .as_primitive::<Date32Type>()
            .value_as_date(row)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Null),
        DataType::Timestamp(unit, _) => {
            let ts = match unit {
                TimeUnit::Second => col.as_primitive::<TimestampSecondType>().value_as_datetime(row),
                TimeUnit::Millisecond => col
                    .as_primitive::<TimestampMillisecondType>()
                    .value_as_datetime(row),
                TimeUnit::Microsecond => col
                    .as_primitive::<TimestampMicrosecondType>()
                    .value_as_datetime(row),
                TimeUnit::Nanosecond => col
                    .as_primitive::<TimestampNanosecondType>()
                    .value_as_datetime(row),
            };
            ts.map(CellValue::Timestamp).unwrap_or(CellValue::Null)
        }
        other => CellValue::Text(format!("{other:?}")),
    }
}

// ---------------------------------------------------------------------------
// Canonical column coercion
// ---------------------------------------------------------------------------

/// Coerce the canonical transaction columns to their typed cells:
///
/// * `Timestamp` → `Timestamp` (text is parsed; dates are kept)
/// * `Transaction_Amount_USD` → `Decimal`
/// * `confusion_value` → `Label` (must be one of TP/FP/TN/FN)
/// * `Bias` → `Integer` 0 or 1
/// * `Gender`, `Race`, `State` → `Text`
///
/// Null cells stay null everywhere; `clean()` decides what to do with them.
pub fn normalize_columns(mut set: RecordSet) -> crate::error::Result<RecordSet> {
    let targets: Vec<(usize, String)> = set
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.clone()))
        .collect();

    for (idx, name) in targets {
        let coerce: fn(&CellValue) -> Result<CellValue, String> = match name.as_str() {
            columns::TIMESTAMP => coerce_timestamp,
            columns::AMOUNT => coerce_amount,
            columns::CONFUSION => coerce_label,
            columns::BIAS => coerce_bias,
            columns::GENDER | columns::RACE | columns::STATE => coerce_text,
            _ => continue,
        };
        for (row_no, row) in set.rows_mut().iter_mut().enumerate() {
            if row[idx].is_null() {
                continue;
            }
            row[idx] = coerce(&row[idx])
                .map_err(|reason| PipelineError::invalid_cell(row_no, name.as_str(), reason))?;
        }
    }
    Ok(set)
}

fn coerce_timestamp(cell: &CellValue) -> Result<CellValue, String> {
    match cell {
        CellValue::Timestamp(_) | CellValue::Date(_) => Ok(cell.clone()),
        CellValue::Text(s) => parse_timestamp(s)
            .map(CellValue::Timestamp)
            .ok_or_else(|| format!("'{s}' is not a timestamp")),
        other => Err(format!("'{other}' is not a timestamp")),
    }
}

fn coerce_amount(cell: &CellValue) -> Result<CellValue, String> {
    if let Some(d) = cell.as_decimal() {
        return Ok(CellValue::Decimal(d));
    }
    match cell {
        CellValue::Text(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .map(CellValue::Decimal)
            .map_err(|_| format!("'{s}' is not an amount")),
        other => Err(format!("'{other}' is not an amount")),
    }
}

fn coerce_label(cell: &CellValue) -> Result<CellValue, String> {
    match cell {
        CellValue::Label(_) => Ok(cell.clone()),
        CellValue::Text(s) => s.parse::<ConfusionLabel>().map(CellValue::Label),
        other => Err(format!("unknown confusion label '{other}'")),
    }
}

fn coerce_bias(cell: &CellValue) -> Result<CellValue, String> {
    let flag = match cell {
        CellValue::Float(f) if *f == 0.0 || *f == 1.0 => Some(*f as i64),
        other => other.as_integer(),
    };
    match flag {
        Some(f @ (0 | 1)) => Ok(CellValue::Integer(f)),
        _ => Err(format!("expected 0 or 1, got {cell}")),
    }
}

fn coerce_text(cell: &CellValue) -> Result<CellValue, String> {
    match cell {
        CellValue::Text(_) => Ok(cell.clone()),
        other => Ok(CellValue::Text(other.to_string())),
    }
}
