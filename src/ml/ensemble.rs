//! Trained stacking ensemble and its fit/predict state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::training::{stack_predictions, EnsembleParams, EnsembleTrainer, ModelScore};
use super::{LinearRegressionModel, ModelType, Regressor, StandardScaler};
use crate::domain::FeatureRow;
use crate::error::{ForecastError, Result};
use crate::forecast::engine::{ForecastOptions, RecursiveForecaster};

/// Combiner coefficients over the base-model outputs ("voting weights").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaWeights {
    pub random_forest: f64,
    pub gradient_boosting: f64,
    pub support_vector: f64,
    pub intercept: f64,
}

impl MetaWeights {
    pub fn from_model(meta: &LinearRegressionModel) -> Result<Self> {
        match meta.coefficients.as_slice() {
            &[random_forest, gradient_boosting, support_vector] => Ok(Self {
                random_forest,
                gradient_boosting,
                support_vector,
                intercept: meta.intercept,
            }),
            other => Err(ForecastError::Training(format!(
                "meta-model expects 3 base predictions, got {}",
                other.len()
            ))),
        }
    }
}

/// What was learned during `fit`, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub model_id: String,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub meta_weights: MetaWeights,
    /// Scores on the training rows for each base model and the ensemble
    pub in_sample: Vec<ModelScore>,
}

/// Fitted scaler, base models and meta-model. Immutable once built.
pub struct TrainedEnsemble {
    scaler: StandardScaler,
    base_models: Vec<Box<dyn Regressor>>,
    meta_model: LinearRegressionModel,
    summary: TrainingSummary,
}

impl std::fmt::Debug for TrainedEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedEnsemble")
            .field("model_id", &self.summary.model_id)
            .field(
                "base_models",
                &self.base_models.iter().map(|m| m.model_type()).collect::<Vec<_>>(),
            )
            .field("meta_model", &self.meta_model)
            .finish()
    }
}

impl TrainedEnsemble {
    pub(crate) fn new(
        scaler: StandardScaler,
        base_models: Vec<Box<dyn Regressor>>,
        meta_model: LinearRegressionModel,
        summary: TrainingSummary,
    ) -> Self {
        Self {
            scaler,
            base_models,
            meta_model,
            summary,
        }
    }

    pub fn id(&self) -> &str {
        &self.summary.model_id
    }

    pub fn summary(&self) -> &TrainingSummary {
        &self.summary
    }

    pub fn base_model_types(&self) -> Vec<ModelType> {
        self.base_models.iter().map(|m| m.model_type()).collect()
    }

    /// Per-row base-model outputs, one column per base model.
    pub fn base_predictions(&self, rows: &[FeatureRow]) -> Result<Vec<Vec<f64>>> {
        if let Some(i) = rows.iter().position(|r| !r.is_finite()) {
            return Err(ForecastError::Input(format!(
                "row {} contains non-finite features",
                i
            )));
        }
        let raw: Vec<Vec<f64>> = rows.iter().map(|r| r.features().to_vec()).collect();
        let scaled = self.scaler.transform(&raw)?;
        stack_predictions(&self.base_models, &scaled)
    }

    /// Standardize, run the base models, combine with the meta-model.
    pub fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let stacked = self.base_predictions(rows)?;
        self.meta_model.predict(&stacked)
    }

    /// Recursive multi-step forecast with the default (cascading, full-buffer) options.
    pub fn forecast(&self, seed_rows: &[FeatureRow], step_count: usize) -> Result<Vec<f64>> {
        RecursiveForecaster::default().forecast(self, seed_rows, step_count)
    }
}

/// Untrained until `fit` succeeds; trained ensembles are never refitted.
pub struct EnsembleForecaster {
    trainer: EnsembleTrainer,
    options: ForecastOptions,
    trained: Option<Arc<TrainedEnsemble>>,
}

impl EnsembleForecaster {
    pub fn new(params: EnsembleParams) -> Self {
        Self {
            trainer: EnsembleTrainer::new(params),
            options: ForecastOptions::default(),
            trained: None,
        }
    }

    pub fn with_options(mut self, options: ForecastOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    pub fn trained(&self) -> Option<&Arc<TrainedEnsemble>> {
        self.trained.as_ref()
    }

    pub fn fit(&mut self, rows: &[FeatureRow]) -> Result<Arc<TrainedEnsemble>> {
        if self.trained.is_some() {
            return Err(ForecastError::State(
                "ensemble is already trained; retraining is not supported".to_string(),
            ));
        }
        let ensemble = Arc::new(self.trainer.fit(rows)?);
        self.trained = Some(Arc::clone(&ensemble));
        Ok(ensemble)
    }

    fn require_trained(&self) -> Result<&TrainedEnsemble> {
        self.trained
            .as_deref()
            .ok_or_else(|| ForecastError::State("ensemble has not been fitted".to_string()))
    }

    pub fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
        self.require_trained()?.predict(rows)
    }

    pub fn forecast(&self, seed_rows: &[FeatureRow], step_count: usize) -> Result<Vec<f64>> {
        let ensemble = self.require_trained()?;
        RecursiveForecaster::new(self.options.clone()).forecast(ensemble, seed_rows, step_count)
    }
}
