//! Machine Learning Module
//!
//! Stacked regression ensemble for water-level forecasting:
//! - Standard scaling of the engineered features
//! - Bagged trees (random forest), boosted trees and a kernel SVR as base models
//! - Ordinary least squares meta-model combining the base predictions
//!
//! # Architecture
//! - [`training`] fits a [`TrainedEnsemble`] and runs hold-out evaluation
//! - [`ensemble`] holds the immutable trained bundle and the fit/predict state machine

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

pub mod ensemble;
pub mod models;
pub mod scaler;
pub mod smartcore;
pub mod svr;
pub mod training;

pub use ensemble::{EnsembleForecaster, MetaWeights, TrainedEnsemble, TrainingSummary};
pub use models::{LinearRegressionModel, Regressor};
pub use scaler::StandardScaler;
pub use self::smartcore::{BoostingParams, ForestParams, GradientBoostingModel, RandomForestModel};
pub use svr::{KernelSvr, SvrParams};
pub use training::{EnsembleParams, EnsembleTrainer, EvaluationReport, ModelScore};

/// ML Model Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    RandomForest,
    GradientBoosting,
    SupportVectorRegression,
    LinearRegression,
    StackedEnsemble,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RandomForest => "random_forest",
            Self::GradientBoosting => "gradient_boosting",
            Self::SupportVectorRegression => "support_vector_regression",
            Self::LinearRegression => "linear_regression",
            Self::StackedEnsemble => "stacked_ensemble",
        };
        write!(f, "{}", s)
    }
}

/// Check that `x` is a non-empty rectangular matrix matching `y`, returning
/// its column count.
pub(crate) fn check_training_data(x: &[Vec<f64>], y: &[f64]) -> Result<usize> {
    if x.is_empty() || y.is_empty() {
        return Err(ForecastError::Training(
            "Cannot train on empty dataset".to_string(),
        ));
    }

    if x.len() != y.len() {
        return Err(ForecastError::Training(format!(
            "Feature and target count mismatch: {} features, {} targets",
            x.len(),
            y.len()
        )));
    }

    check_columns(x)
}

/// Column count of a rectangular matrix given as rows.
pub(crate) fn check_columns(x: &[Vec<f64>]) -> Result<usize> {
    let n_features = x.first().map_or(0, Vec::len);
    if x.iter().any(|row| row.len() != n_features) {
        return Err(ForecastError::Input(
            "All feature vectors must have the same length".to_string(),
        ));
    }
    Ok(n_features)
}
