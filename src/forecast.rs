//! Forecasting collaborator.
//!
//! The pipeline only depends on [`Forecaster`]; models plug in behind it.
//! [`MovingAverageForecaster`] is the built-in stand-in.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::pipeline::format::DenseSeries;

/// One predicted value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Predicts the `steps` days that follow a dense daily series.
pub trait Forecaster {
    fn forecast(&self, series: &DenseSeries, steps: usize) -> Result<Vec<ForecastPoint>>;
}

/// Predicts each day as the mean of the trailing `window` values, feeding
/// its own predictions back in as it rolls forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverageForecaster {
    window: usize,
}

impl MovingAverageForecaster {
    /// A zero window is treated as 1 (repeat the last value).
    pub fn new(window: usize) -> Self {
        MovingAverageForecaster {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for MovingAverageForecaster {
    fn default() -> Self {
        Self::new(7)
    }
}

impl Forecaster for MovingAverageForecaster {
    fn forecast(&self, series: &DenseSeries, steps: usize) -> Result<Vec<ForecastPoint>> {
        if steps == 0 {
            return Ok(Vec::new());
        }
        let last = series.last_date().ok_or_else(|| {
            PipelineError::input(format!("no {} history to forecast from", series.metric()))
        })?;

        let mut history = series.to_f64();
        let mut points = Vec::with_capacity(steps);
        for step in 1..=steps {
            let tail = &history[history.len().saturating_sub(self.window)..];
            let value = tail.iter().sum::<f64>() / tail.len() as f64;
            let date = last.checked_add_days(Days::new(step as u64)).ok_or_else(|| {
                PipelineError::input(format!("forecast horizon {steps} overflows the calendar"))
            })?;
            points.push(ForecastPoint { date, value });
            history.push(value);
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::pipeline::format::gap_fill;
    use crate::series::{Metric, MetricSeries, SeriesPoint};

    fn dense(values: &[i64]) -> DenseSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| SeriesPoint {
                date: start + Days::new(i as u64),
                value: Decimal::from(*v),
            })
            .collect();
        gap_fill(&MetricSeries::from_points(Metric::Revenue, points).unwrap()).unwrap()
    }

    #[test]
    fn test_moving_average_rolls_forward() {
        let forecaster = MovingAverageForecaster::new(2);
        let points = forecaster.forecast(&dense(&[0, 4, 8]), 2).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(points[0].value, 6.0);
        // mean of 8 and the first prediction
        assert_eq!(points[1].value, 7.0);
    }

    #[test]
    fn test_window_larger_than_history() {
        let points = MovingAverageForecaster::default()
            .forecast(&dense(&[3, 6]), 1)
            .unwrap();
        assert_eq!(points[0].value, 4.5);
    }

    #[test]
    fn test_zero_steps_and_empty_history() {
        let forecaster = MovingAverageForecaster::new(0);
        assert_eq!(forecaster.window(), 1);
        assert!(forecaster.forecast(&dense(&[1]), 0).unwrap().is_empty());
        assert!(matches!(
            forecaster.forecast(&dense(&[]), 3),
            Err(PipelineError::Input(_))
        ));
        // Nothing to predict needs no history.
        assert!(forecaster.forecast(&dense(&[]), 0).unwrap().is_empty());
    }
}
