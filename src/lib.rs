//! Breaking Bias transaction pipeline.
//!
//! Loads transaction records, filters them by demographic attributes,
//! reinterprets biased false positives, aggregates daily frequency and
//! revenue series, and shapes them for display or forecasting.

pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod pipeline;
pub mod series;
pub mod service;

pub use config::AppConfig;
pub use data::model::{CellValue, ConfusionLabel, RecordSet};
pub use error::{PipelineError, Result};
pub use forecast::{Forecaster, MovingAverageForecaster};
pub use pipeline::transformer::RecordTransformer;
pub use series::{Metric, MetricSeries};
pub use service::{Route, SeriesService};
