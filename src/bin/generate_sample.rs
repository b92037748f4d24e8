//! Write a synthetic transaction data set.
//!
//!   generate_sample [OUTPUT] [--rows N] [--days N] [--seed N]
//!
//! OUTPUT ending in `.parquet` writes Parquet, anything else CSV.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::Parser;
use parquet::arrow::ArrowWriter;

/// Generate a synthetic transactions file for the pipeline
#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
#[command(version, about, long_about = None)]
struct Args {
    /// Output file (.csv or .parquet)
    #[arg(default_value = "transactions.csv")]
    output: PathBuf,

    /// Number of transactions
    #[arg(short, long, default_value_t = 5000)]
    rows: usize,

    /// Days covered, starting 2024-01-01
    #[arg(short, long, default_value_t = 90, value_parser = clap::value_parser!(i64).range(1..=3650))]
    days: i64,

    /// PRNG seed
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len() as u64) as usize]
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct Transaction {
    timestamp: NaiveDateTime,
    amount: f64,
    label: &'static str,
    bias: i64,
    gender: &'static str,
    race: &'static str,
    state: Option<&'static str>,
}

const GENDERS: &[&str] = &["Female", "Male", "Non-binary"];
const RACES: &[&str] = &["Asian", "Black", "Hispanic", "White", "Other"];
const STATES: &[&str] = &["CA", "NY", "TX", "FL", "IL", "WA"];

fn generate(rows: usize, days: i64, rng: &mut SimpleRng) -> Result<Vec<Transaction>> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid start date")?;
    let minutes = (days * 24 * 60) as u64;

    let mut out = Vec::with_capacity(rows);
    for _ in 0..rows {
        let race = rng.pick(RACES);
        let fraud = rng.next_f64() < 0.08;
        // The model over-flags some groups; those blocks carry the bias flag.
        let over_flagged = matches!(race, "Black" | "Hispanic") && rng.next_f64() < 0.12;
        let caught = rng.next_f64() < 0.85;
        let spurious = rng.next_f64() < 0.03;

        let (label, bias) = match (fraud, over_flagged) {
            (true, _) if caught => ("TP", 0),
            (true, _) => ("FN", 0),
            (false, true) => ("FP", 1),
            (false, false) if spurious => ("FP", 0),
            (false, false) => ("TN", 0),
        };

        out.push(Transaction {
            timestamp: start + Duration::minutes(rng.below(minutes) as i64),
            amount: (rng.gauss(85.0, 40.0).abs() * 100.0).round() / 100.0,
            label,
            bias,
            gender: rng.pick(GENDERS),
            race,
            // Roughly one row in fifty has no state, as in the real export.
            state: (rng.below(50) != 0).then(|| rng.pick(STATES)),
        });
    }
    out.sort_by_key(|t| t.timestamp);
    Ok(out)
}

fn write_csv(path: &Path, rows: &[Transaction]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    writer.write_record([
        "Timestamp",
        "Transaction_Amount_USD",
        "confusion_value",
        "Bias",
        "Gender",
        "Race",
        "State",
    ])?;
    for t in rows {
        writer.write_record([
            t.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("{:.2}", t.amount),
            t.label.to_string(),
            t.bias.to_string(),
            t.gender.to_string(),
            t.race.to_string(),
            t.state.unwrap_or("").to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &Path, rows: &[Transaction]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("Timestamp", DataType::Utf8, false),
        Field::new("Transaction_Amount_USD", DataType::Float64, false),
        Field::new("confusion_value", DataType::Utf8, false),
        Field::new("Bias", DataType::Int64, false),
        Field::new("Gender", DataType::Utf8, false),
        Field::new("Race", DataType::Utf8, false),
        Field::new("State", DataType::Utf8, true),
    ]));

    let timestamps: Vec<String> = rows
        .iter()
        .map(|t| t.timestamp.format("%Y-%m-%d %H:%M:%S").to_string())
        .collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            timestamps.iter().map(String::as_str).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(rows.iter().map(|t| t.amount).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|t| t.label).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(rows.iter().map(|t| t.bias).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|t| t.gender).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|t| t.race).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|t| t.state).collect::<Vec<_>>())),
    ];

    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;
    let file = std::fs::File::create(path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut rng = SimpleRng::new(args.seed);
    let transactions = generate(args.rows, args.days, &mut rng)?;

    let path = args.output.as_path();
    if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
        write_parquet(path, &transactions)?;
    } else {
        write_csv(path, &transactions)?;
    }

    println!(
        "Wrote {} transactions over {} days to {}",
        transactions.len(),
        args.days,
        path.display()
    );
    Ok(())
}
