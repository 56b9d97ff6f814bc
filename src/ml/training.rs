//! Ensemble Training Pipeline
//!
//! Fits the stacked ensemble, and runs the shuffled hold-out evaluation used
//! to compare the base models against the combined prediction.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ensemble::{MetaWeights, TrainedEnsemble, TrainingSummary};
use super::{
    BoostingParams, ForestParams, GradientBoostingModel, KernelSvr, LinearRegressionModel,
    ModelType, RandomForestModel, Regressor, StandardScaler, SvrParams,
};
use crate::domain::{FeatureRow, LAG_DEPTH};
use crate::error::{ForecastError, Result};
use crate::forecast::metrics::ForecastMetrics;

/// Hyperparameters of the three base models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleParams {
    pub forest: ForestParams,
    pub boosting: BoostingParams,
    pub svr: SvrParams,
}

/// Training Dataset
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingDataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    /// Rows must all carry a finite target and there must be at least
    /// [`LAG_DEPTH`] of them.
    pub fn from_rows(rows: &[FeatureRow]) -> Result<Self> {
        if rows.len() < LAG_DEPTH {
            return Err(ForecastError::InsufficientData {
                required: LAG_DEPTH,
                available: rows.len(),
            });
        }

        let mut features = Vec::with_capacity(rows.len());
        let mut targets = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let target = row
                .target
                .ok_or_else(|| ForecastError::Input(format!("row {} has no target value", i)))?;
            if !row.is_finite() {
                return Err(ForecastError::Data(format!("row {} contains non-finite values", i)));
            }
            features.push(row.features().to_vec());
            targets.push(target);
        }

        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }

    /// Shuffle with a seeded RNG, then put `ceil(test_ratio * n)` rows in the
    /// test set and the rest in the training set.
    pub fn shuffle_split(&self, test_ratio: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_ratio > 0.0 && test_ratio < 1.0) {
            return Err(ForecastError::Input(format!(
                "test ratio must be between 0 and 1, got {}",
                test_ratio
            )));
        }

        let n_test = (self.len() as f64 * test_ratio).ceil() as usize;
        let n_train = self.len().saturating_sub(n_test);
        if n_train < LAG_DEPTH || n_test == 0 {
            return Err(ForecastError::InsufficientData {
                required: LAG_DEPTH + 1,
                available: self.len(),
            });
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test_idx, train_idx) = indices.split_at(n_test);

        Ok((self.subset(train_idx), self.subset(test_idx)))
    }
}

/// Error metrics of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: ModelType,
    pub metrics: ForecastMetrics,
}

/// Hold-out comparison of the base models and the stacked ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub test_ratio: f64,
    pub seed: u64,
    pub meta_weights: MetaWeights,
    pub scores: Vec<ModelScore>,
}

impl EvaluationReport {
    pub fn score(&self, model: ModelType) -> Option<&ForecastMetrics> {
        self.scores
            .iter()
            .find(|s| s.model == model)
            .map(|s| &s.metrics)
    }
}

/// Run every base model over `x` and lay the outputs side by side, one row per sample.
pub(crate) fn stack_predictions(
    models: &[Box<dyn Regressor>],
    x: &[Vec<f64>],
) -> Result<Vec<Vec<f64>>> {
    let columns = models
        .iter()
        .map(|m| m.predict(x))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..x.len())
        .map(|i| columns.iter().map(|col| col[i]).collect())
        .collect())
}

fn score_models(
    models: &[Box<dyn Regressor>],
    stacked: &[Vec<f64>],
    ensemble: &[f64],
    targets: &[f64],
) -> Result<Vec<ModelScore>> {
    let mut scores = Vec::with_capacity(models.len() + 1);
    for (k, model) in models.iter().enumerate() {
        let column: Vec<f64> = stacked.iter().map(|row| row[k]).collect();
        scores.push(ModelScore {
            model: model.model_type(),
            metrics: ForecastMetrics::calculate(targets, &column)?,
        });
    }
    scores.push(ModelScore {
        model: ModelType::StackedEnsemble,
        metrics: ForecastMetrics::calculate(targets, ensemble)?,
    });
    Ok(scores)
}

/// Ensemble Trainer
#[derive(Debug, Clone, Default)]
pub struct EnsembleTrainer {
    params: EnsembleParams,
}

impl EnsembleTrainer {
    pub fn new(params: EnsembleParams) -> Self {
        Self { params }
    }

    /// Forest, boosting, SVR, in that order.
    fn fit_base_models(&self, x: &[Vec<f64>], y: &[f64]) -> Result<Vec<Box<dyn Regressor>>> {
        let started = Instant::now();
        let forest = RandomForestModel::fit(x, y, &self.params.forest)?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "random forest fitted");

        let started = Instant::now();
        let boosting = GradientBoostingModel::fit(x, y, &self.params.boosting)?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "gradient boosting fitted");

        let started = Instant::now();
        let svr = KernelSvr::fit(x, y, &self.params.svr)?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            support_vectors = svr.n_support_vectors(),
            bias = svr.bias(),
            "svr fitted"
        );

        let models: Vec<Box<dyn Regressor>> =
            vec![Box::new(forest), Box::new(boosting), Box::new(svr)];
        Ok(models)
    }

    /// Fit scaler, base models and meta-model on `rows`.
    ///
    /// The meta-model is trained on the base models' predictions for the same
    /// rows they were fitted on; no rows are held out.
    pub fn fit(&self, rows: &[FeatureRow]) -> Result<TrainedEnsemble> {
        let started = Instant::now();
        let dataset = TrainingDataset::from_rows(rows)?;
        info!(rows = dataset.len(), "training stacked ensemble");

        let scaler = StandardScaler::fit(&dataset.features)?;
        let scaled = scaler.transform(&dataset.features)?;

        let base_models = self.fit_base_models(&scaled, &dataset.targets)?;
        let stacked = stack_predictions(&base_models, &scaled)?;

        let meta_model = LinearRegressionModel::fit(&stacked, &dataset.targets)?;
        let meta_weights = MetaWeights::from_model(&meta_model)?;
        let ensemble_predictions = meta_model.predict(&stacked)?;
        let in_sample = score_models(&base_models, &stacked, &ensemble_predictions, &dataset.targets)?;

        let summary = TrainingSummary {
            model_id: format!("stacked_ensemble_{}", uuid::Uuid::new_v4()),
            trained_at: chrono::Utc::now(),
            training_rows: dataset.len(),
            meta_weights,
            in_sample,
        };

        info!(
            model_id = %summary.model_id,
            rows = summary.training_rows,
            w_forest = summary.meta_weights.random_forest,
            w_boosting = summary.meta_weights.gradient_boosting,
            w_svr = summary.meta_weights.support_vector,
            intercept = summary.meta_weights.intercept,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stacked ensemble trained"
        );

        Ok(TrainedEnsemble::new(scaler, base_models, meta_model, summary))
    }

    /// Shuffled train/test split: base models learn on the training part, the
    /// meta-model is fitted on the base predictions for the test part, and
    /// every model is scored on the test targets.
    pub fn evaluate_holdout(
        &self,
        rows: &[FeatureRow],
        test_ratio: f64,
        seed: u64,
    ) -> Result<EvaluationReport> {
        let dataset = TrainingDataset::from_rows(rows)?;
        let (train, test) = dataset.shuffle_split(test_ratio, seed)?;
        info!(train = train.len(), test = test.len(), "evaluating ensemble on hold-out split");

        let scaler = StandardScaler::fit(&train.features)?;
        let train_x = scaler.transform(&train.features)?;
        let test_x = scaler.transform(&test.features)?;

        let base_models = self.fit_base_models(&train_x, &train.targets)?;
        let stacked = stack_predictions(&base_models, &test_x)?;

        let meta_model = LinearRegressionModel::fit(&stacked, &test.targets)?;
        let ensemble_predictions = meta_model.predict(&stacked)?;
        let scores = score_models(&base_models, &stacked, &ensemble_predictions, &test.targets)?;

        for score in &scores {
            info!(model = %score.model, mse = score.metrics.mse, "hold-out score");
        }

        Ok(EvaluationReport {
            train_rows: train.len(),
            test_rows: test.len(),
            test_ratio,
            seed,
            meta_weights: MetaWeights::from_model(&meta_model)?,
            scores,
        })
    }
}
