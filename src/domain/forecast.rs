use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A forecast value paired with the calendar day it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Water-level forecast produced by the stacked ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LakeForecast {
    /// Forecasted points, one per day
    pub points: Vec<ForecastPoint>,

    /// Timestamp when forecast was generated
    pub generated_at: DateTime<Utc>,

    /// Identifier of the ensemble that produced the forecast
    pub model_id: String,
}

impl LakeForecast {
    /// Pair forecast values with consecutive days starting after `last_observed`.
    pub fn from_values(last_observed: NaiveDate, values: &[f64], model_id: String) -> Self {
        let points = future_dates(last_observed, values.len())
            .into_iter()
            .zip(values.iter())
            .map(|(date, &value)| ForecastPoint { date, value })
            .collect();

        Self {
            points,
            generated_at: Utc::now(),
            model_id,
        }
    }

    pub fn horizon_days(&self) -> usize {
        self.points.len()
    }

    pub fn average_level(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let sum: f64 = self.points.iter().map(|p| p.value).sum();
        Some(sum / self.points.len() as f64)
    }

    pub fn min_level(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).min_by(f64::total_cmp)
    }

    pub fn max_level(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).max_by(f64::total_cmp)
    }
}

/// One date per day, starting the day after `last_observed`.
pub fn future_dates(last_observed: NaiveDate, steps: usize) -> Vec<NaiveDate> {
    last_observed
        .iter_days()
        .skip(1)
        .take(steps)
        .collect()
}
