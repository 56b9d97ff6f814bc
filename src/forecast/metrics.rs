//! Forecast Metrics and Evaluation
//!
//! Error metrics used for the in-sample training summary and the hold-out
//! evaluation report.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::ForecastError;

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Square Error
    pub mse: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
    /// Number of samples evaluated
    pub sample_count: usize,
    /// Maximum absolute error observed
    pub max_error: f64,
}

impl ForecastMetrics {
    /// Calculate metrics from actual and predicted values
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, ForecastMetricsError> {
        if actual.len() != predicted.len() {
            return Err(ForecastMetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }

        if actual.is_empty() {
            return Err(ForecastMetricsError::EmptyData);
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual
            .iter()
            .zip(predicted.iter())
            .map(|(a, p)| a - p)
            .collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let mse = sse / n;
        let rmse = mse.sqrt();

        let mean_actual = actual.iter().sum::<f64>() / n;
        let total_variance: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
        let r2 = if total_variance > 1e-10 {
            1.0 - sse / total_variance
        } else {
            0.0
        };

        let max_error = errors.iter().map(|e| e.abs()).fold(0.0f64, f64::max);

        Ok(ForecastMetrics {
            mae,
            mse,
            rmse,
            r2,
            sample_count: actual.len(),
            max_error,
        })
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MSE: {:.4}, MAE: {:.4}, RMSE: {:.4}, R²: {:.3} (n={})",
            self.mse, self.mae, self.rmse, self.r2, self.sample_count
        )
    }
}

#[derive(Debug, Error)]
pub enum ForecastMetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,
}

impl From<ForecastMetricsError> for ForecastError {
    fn from(error: ForecastMetricsError) -> Self {
        ForecastError::Input(error.to_string())
    }
}
