use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Largest lag shift used by the feature pipeline.
pub const LAG_DEPTH: usize = 6;

/// Number of model inputs in a [`FeatureRow`].
pub const N_FEATURES: usize = 6;

/// Column order of [`FeatureRow::features`].
pub const FEATURE_NAMES: [&str; N_FEATURES] = ["year", "month", "day", "lag1", "lag3", "lag6"];

/// A single measurement of the target series (e.g. Kariba height variation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Engineered row: calendar features, three lags and (for training rows) the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub lag1: f64,
    pub lag3: f64,
    pub lag6: f64,
    /// Absent on synthetic rows appended while forecasting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

impl FeatureRow {
    pub fn new(date: NaiveDate, lag1: f64, lag3: f64, lag6: f64, target: Option<f64>) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            lag1,
            lag3,
            lag6,
            target,
        }
    }

    /// Feature vector in [`FEATURE_NAMES`] order.
    pub fn features(&self) -> [f64; N_FEATURES] {
        [
            self.year as f64,
            self.month as f64,
            self.day as f64,
            self.lag1,
            self.lag3,
            self.lag6,
        ]
    }

    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    pub fn is_finite(&self) -> bool {
        self.lag1.is_finite()
            && self.lag3.is_finite()
            && self.lag6.is_finite()
            && self.target.map_or(true, f64::is_finite)
    }
}
