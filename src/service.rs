//! Application state: the loaded lake series and the ensemble trained on it.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::Config;
use crate::domain::{FeatureRow, LakeForecast, Observation};
use crate::error::{ForecastError, Result};
use crate::forecast::{CancelFlag, FeaturePipeline, RecursiveForecaster};
use crate::ingest;
use crate::ml::{EnsembleForecaster, EnsembleTrainer, EvaluationReport, TrainedEnsemble, TrainingSummary};

/// Historical series plus the ensemble fitted on it. Built once at startup.
pub struct LakeService {
    cfg: Arc<Config>,
    observations: Vec<Observation>,
    rows: Vec<FeatureRow>,
    ensemble: Arc<TrainedEnsemble>,
    evaluation: OnceCell<EvaluationReport>,
}

impl LakeService {
    /// Build features and fit the ensemble on `observations`.
    pub fn train(cfg: Arc<Config>, observations: Vec<Observation>) -> Result<Self> {
        let rows = FeaturePipeline::new().build(&observations)?;
        let ensemble = EnsembleTrainer::new(cfg.ensemble.clone()).fit(&rows)?;

        Ok(Self {
            cfg,
            observations,
            rows,
            ensemble: Arc::new(ensemble),
            evaluation: OnceCell::new(),
        })
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn ensemble(&self) -> &Arc<TrainedEnsemble> {
        &self.ensemble
    }

    pub fn summary(&self) -> &TrainingSummary {
        self.ensemble.summary()
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn check_steps(&self, steps: usize) -> Result<()> {
        let max = self.cfg.forecast.max_steps;
        if steps == 0 || steps > max {
            return Err(ForecastError::Input(format!(
                "steps must be in 1..={}, got {}",
                max, steps
            )));
        }
        Ok(())
    }

    fn recursive(&self, cancel: Option<CancelFlag>) -> RecursiveForecaster {
        RecursiveForecaster::new(self.cfg.forecast.options()).with_cancel(cancel)
    }

    /// Forecast `steps` days past the last observation, seeded with the
    /// full processed history. Raising `cancel` stops the loop early.
    pub fn forecast(&self, steps: usize, cancel: Option<CancelFlag>) -> Result<LakeForecast> {
        self.check_steps(steps)?;
        let last = self
            .observations
            .last()
            .ok_or_else(|| ForecastError::State("no observations loaded".to_string()))?;

        let values = self
            .recursive(cancel)
            .forecast(&self.ensemble, &self.rows, steps)?;
        Ok(LakeForecast::from_values(
            last.date,
            &values,
            self.ensemble.id().to_string(),
        ))
    }

    /// Fit a fresh ensemble on a caller-supplied series and forecast from it.
    pub fn forecast_series(
        &self,
        observations: &[Observation],
        steps: usize,
        cancel: Option<CancelFlag>,
    ) -> Result<LakeForecast> {
        self.check_steps(steps)?;
        let last = observations.last().ok_or_else(|| {
            ForecastError::Input("at least one observation is required".to_string())
        })?;

        let rows = FeaturePipeline::new().build(observations)?;
        let ensemble = EnsembleForecaster::new(self.cfg.ensemble.clone()).fit(&rows)?;
        let values = self.recursive(cancel).forecast(&ensemble, &rows, steps)?;

        Ok(LakeForecast::from_values(
            last.date,
            &values,
            ensemble.id().to_string(),
        ))
    }

    /// Hold-out evaluation over the loaded history.
    pub fn evaluate(&self) -> Result<EvaluationReport> {
        EnsembleTrainer::new(self.cfg.ensemble.clone()).evaluate_holdout(
            &self.rows,
            self.cfg.evaluation.test_ratio,
            self.cfg.evaluation.seed,
        )
    }

    pub fn cached_evaluation(&self) -> Option<&EvaluationReport> {
        self.evaluation.get()
    }

    /// Like [`Self::evaluate`], run on the blocking pool once and cached.
    pub async fn evaluation(self: &Arc<Self>) -> Result<EvaluationReport> {
        let service = Arc::clone(self);
        self.evaluation
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || service.evaluate())
                    .await
                    .map_err(|e| ForecastError::Training(format!("evaluation task failed: {}", e)))?
            })
            .await
            .cloned()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub lake: Arc<LakeService>,
}

impl AppState {
    /// Load the configured CSV and train the ensemble off the async runtime.
    pub async fn new(cfg: Config) -> anyhow::Result<Self> {
        let cfg = Arc::new(cfg);
        let data = cfg.data.clone();

        let observations = tokio::task::spawn_blocking(move || {
            ingest::load_observations(&data.lake_csv, &data.date_column, &data.target_column)
        })
        .await?
        .context("loading lake level history")?;

        let service_cfg = Arc::clone(&cfg);
        let lake = tokio::task::spawn_blocking(move || LakeService::train(service_cfg, observations))
            .await?
            .context("training stacked ensemble")?;

        info!(
            model_id = lake.ensemble().id(),
            observations = lake.observations().len(),
            "lake service ready"
        );
        Ok(Self::from_service(cfg, lake))
    }

    pub fn from_service(cfg: Arc<Config>, lake: LakeService) -> Self {
        Self {
            cfg,
            lake: Arc::new(lake),
        }
    }
}
