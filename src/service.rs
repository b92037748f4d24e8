//! Request handling for the dashboard endpoints.
//!
//! This is the contract between a web layer and the pipeline: a route, a
//! JSON body in, a JSON body out. Binding it to an HTTP server is left to
//! the caller.

use std::fmt;

use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::model::RecordSet;
use crate::error::{PipelineError, Result};
use crate::forecast::Forecaster;
use crate::pipeline::format::{self, DenseSeries, DisplayData, DisplayRecord};
use crate::pipeline::transformer::RecordTransformer;

/// Frontend spelling of "no filter".
pub const NO_FILTER: &str = "NoFilter";

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PastData,
    PredictData,
    PastDataUnbiased,
    PredictDataUnbiased,
}

impl Route {
    pub const ALL: [Route; 4] = [
        Route::PastData,
        Route::PredictData,
        Route::PastDataUnbiased,
        Route::PredictDataUnbiased,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::PastData => "/getPastData",
            Route::PredictData => "/predictData",
            Route::PastDataUnbiased => "/getPastDataUnbiased",
            Route::PredictDataUnbiased => "/predictDataUnbiased",
        }
    }

    /// Accepts the path with or without its leading slash.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');
        Self::ALL
            .into_iter()
            .find(|r| r.path().trim_start_matches('/') == path)
    }

    /// Whether biased false positives are relabelled before aggregating.
    pub fn unbiased(&self) -> bool {
        matches!(self, Route::PastDataUnbiased | Route::PredictDataUnbiased)
    }

    pub fn is_prediction(&self) -> bool {
        matches!(self, Route::PredictData | Route::PredictDataUnbiased)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// `filtering_factor` as sent by clients: either the dashboard's positional
/// `[gender, race]` (optionally `[gender, race, state]`) or an object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilteringFactor {
    Positional(Vec<Option<String>>),
    Named(NamedFilters),
}

/// Object form of `filtering_factor`. Unknown keys are rejected so a
/// misspelled attribute cannot silently widen the population.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamedFilters {
    pub gender: Option<String>,
    pub race: Option<String>,
    pub state: Option<String>,
}

/// Normalized filter selection. `None` means "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub gender: Option<String>,
    pub race: Option<String>,
    pub state: Option<String>,
}

impl TryFrom<FilteringFactor> for FilterSelection {
    type Error = PipelineError;

    fn try_from(factor: FilteringFactor) -> Result<Self> {
        let (gender, race, state) = match factor {
            FilteringFactor::Named(NamedFilters {
                gender,
                race,
                state,
            }) => (gender, race, state),
            FilteringFactor::Positional(values) => {
                if values.len() > 3 {
                    return Err(PipelineError::input(format!(
                        "'filtering_factor' takes at most 3 values, got {}",
                        values.len()
                    )));
                }
                let mut it = values.into_iter();
                (
                    it.next().flatten(),
                    it.next().flatten(),
                    it.next().flatten(),
                )
            }
        };
        Ok(FilterSelection {
            gender: active(gender),
            race: active(race),
            state: active(state),
        })
    }
}

fn active(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != NO_FILTER)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PastDataRequest {
    pub filtering_factor: FilteringFactor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub filtering_factor: FilteringFactor,
    pub num_points: usize,
}

fn parse_body<T: DeserializeOwned>(body: &Value) -> Result<T> {
    T::deserialize(body).map_err(|e| PipelineError::input(format!("malformed request body: {e}")))
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Forecast frequency and revenue, named the way the dashboard reads them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionData {
    pub frequency_graph: Vec<DisplayRecord>,
    pub revenue_graph: Vec<DisplayRecord>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Serves the dashboard routes over a read-only record set.
///
/// Each call runs the pipeline on its own copy of the data, so one service
/// can answer any number of requests.
pub struct SeriesService<F> {
    records: RecordSet,
    forecaster: F,
    max_points: usize,
}

impl<F: Forecaster> SeriesService<F> {
    pub fn new(records: RecordSet, forecaster: F, max_points: usize) -> Self {
        SeriesService {
            records,
            forecaster,
            max_points,
        }
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    /// Dispatch one request body to a route and return the response body.
    pub fn handle(&self, route: Route, body: &Value) -> Result<Value> {
        info!("handling {route}");
        let response = if route.is_prediction() {
            let request: PredictRequest = parse_body(body)?;
            let filters: FilterSelection = request.filtering_factor.try_into()?;
            let data = self.predict(&filters, request.num_points, route.unbiased())?;
            serde_json::to_value(data)
        } else {
            let request: PastDataRequest = parse_body(body)?;
            let filters: FilterSelection = request.filtering_factor.try_into()?;
            let data = self.past_data(&filters, route.unbiased())?;
            serde_json::to_value(data)
        };
        response.map_err(|e| PipelineError::validation(format!("unserializable response: {e}")))
    }

    /// Past frequency and revenue for the selected population.
    pub fn past_data(&self, filters: &FilterSelection, unbiased: bool) -> Result<DisplayData> {
        self.prepare(filters, unbiased)?.for_display()
    }

    /// Forecast `num_points` days of frequency and revenue.
    pub fn predict(
        &self,
        filters: &FilterSelection,
        num_points: usize,
        unbiased: bool,
    ) -> Result<PredictionData> {
        if num_points > self.max_points {
            return Err(PipelineError::input(format!(
                "'num_points' must be at most {}, got {num_points}",
                self.max_points
            )));
        }
        let (frequency, revenue) = self.prepare(filters, unbiased)?.for_predicting()?;
        Ok(PredictionData {
            frequency_graph: self.forecast_records(&frequency, num_points)?,
            revenue_graph: self.forecast_records(&revenue, num_points)?,
        })
    }

    fn forecast_records(&self, series: &DenseSeries, steps: usize) -> Result<Vec<DisplayRecord>> {
        let points = self.forecaster.forecast(series, steps)?;
        Ok(format::forecast_records(series.metric(), &points))
    }

    /// Filter, optionally unbias, then keep only transactions that went through.
    fn prepare(&self, filters: &FilterSelection, unbiased: bool) -> Result<RecordTransformer> {
        let mut transformer = RecordTransformer::new(&self.records).filter_by(
            filters.gender.as_deref(),
            filters.race.as_deref(),
            filters.state.as_deref(),
        )?;
        if unbiased {
            transformer = transformer.unbias()?;
        }
        transformer.filter_invalid_transactions()
    }
}
