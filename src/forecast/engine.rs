use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::FeatureRow;
use crate::error::{ForecastError, Result};
use crate::ml::TrainedEnsemble;

/// How the lag columns of a synthetic row are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LagUpdate {
    /// lag1 = prediction, lag3 = previous lag1, lag6 = previous lag3
    #[default]
    Cascade,
    /// lag3 and lag6 are read back from the buffer's realized sequence
    History,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastOptions {
    pub lag_update: LagUpdate,
    /// Run the ensemble over the whole buffer every step instead of only its last row.
    pub recompute_full_buffer: bool,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            lag_update: LagUpdate::Cascade,
            recompute_full_buffer: true,
        }
    }
}

/// Raised from another thread to stop a running forecast before its next step.
pub type CancelFlag = Arc<AtomicBool>;

/// Rolls a trained ensemble forward one day at a time, feeding each
/// prediction back in as the newest lag.
#[derive(Debug, Clone, Default)]
pub struct RecursiveForecaster {
    options: ForecastOptions,
    cancel: Option<CancelFlag>,
}

impl RecursiveForecaster {
    pub fn new(options: ForecastOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<CancelFlag>) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn options(&self) -> &ForecastOptions {
        &self.options
    }

    pub fn forecast(
        &self,
        ensemble: &TrainedEnsemble,
        seed_rows: &[FeatureRow],
        step_count: usize,
    ) -> Result<Vec<f64>> {
        if seed_rows.is_empty() {
            return Err(ForecastError::Input(
                "forecast needs at least one seed row".to_string(),
            ));
        }
        if let Some(i) = seed_rows.iter().position(|r| !r.is_finite()) {
            return Err(ForecastError::Input(format!(
                "seed row {} contains non-finite features",
                i
            )));
        }

        let mut buffer = seed_rows.to_vec();
        buffer.reserve(step_count);
        let mut predictions = Vec::with_capacity(step_count);

        for step in 0..step_count {
            if self.is_cancelled() {
                debug!(step, steps = step_count, "recursive forecast cancelled");
                return Err(ForecastError::State(format!(
                    "forecast cancelled after {} of {} steps",
                    step, step_count
                )));
            }
            let prediction = self.predict_last(ensemble, &buffer)?;
            if !prediction.is_finite() {
                return Err(ForecastError::Training(format!(
                    "ensemble produced a non-finite value at step {}",
                    step
                )));
            }
            predictions.push(prediction);

            let next = self.next_row(&buffer, prediction)?;
            buffer.push(next);
        }

        debug!(
            steps = step_count,
            seed_rows = seed_rows.len(),
            model_id = ensemble.id(),
            "recursive forecast finished"
        );
        Ok(predictions)
    }

    fn predict_last(&self, ensemble: &TrainedEnsemble, buffer: &[FeatureRow]) -> Result<f64> {
        // predictions are row-independent, so the last row alone gives the same value
        let rows = if self.options.recompute_full_buffer {
            buffer
        } else {
            &buffer[buffer.len().saturating_sub(1)..]
        };
        ensemble
            .predict(rows)?
            .last()
            .copied()
            .ok_or_else(|| ForecastError::State("forecast buffer is empty".to_string()))
    }

    /// Copy of the last row (calendar columns unchanged) with shifted lags.
    fn next_row(&self, buffer: &[FeatureRow], prediction: f64) -> Result<FeatureRow> {
        let last = buffer
            .last()
            .ok_or_else(|| ForecastError::State("forecast buffer is empty".to_string()))?;

        let (lag3, lag6) = match self.options.lag_update {
            LagUpdate::Cascade => (last.lag1, last.lag3),
            LagUpdate::History => {
                // row j carries y[j-1] as lag1, so y[m-k] sits in row m-k+1
                let m = buffer.len();
                let realized = |k: usize| m.checked_sub(k - 1).map(|j| buffer[j].lag1);
                (
                    realized(3).unwrap_or(last.lag1),
                    realized(6).unwrap_or(last.lag3),
                )
            }
        };

        Ok(FeatureRow {
            lag1: prediction,
            lag3,
            lag6,
            target: None,
            ..*last
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, LAG_DEPTH};
    use crate::forecast::FeaturePipeline;
    use crate::ml::{BoostingParams, EnsembleParams, EnsembleTrainer, ForestParams, SvrParams};
    use chrono::NaiveDate;

    fn observations(n: usize) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        start
            .iter_days()
            .take(n)
            .enumerate()
            .map(|(i, date)| Observation::new(date, 478.0 + (i as f64 / 6.0).sin() * 2.5))
            .collect()
    }

    fn trained(rows: &[FeatureRow]) -> TrainedEnsemble {
        EnsembleTrainer::new(EnsembleParams {
            forest: ForestParams {
                n_trees: 8,
                max_depth: Some(6),
                seed: 42,
            },
            boosting: BoostingParams {
                n_trees: 25,
                max_depth: 3,
                learning_rate: 0.1,
            },
            svr: SvrParams::default(),
        })
        .fit(rows)
        .unwrap()
    }

    fn setup() -> (TrainedEnsemble, Vec<FeatureRow>) {
        let rows = FeaturePipeline::new().build(&observations(70)).unwrap();
        (trained(&rows), rows)
    }

    #[test]
    fn test_first_steps_follow_cascade_rule() {
        let (ensemble, rows) = setup();
        let forecast = ensemble.forecast(&rows, 2).unwrap();
        assert_eq!(forecast.len(), 2);

        let in_sample = ensemble.predict(&rows).unwrap();
        assert_eq!(forecast[0], *in_sample.last().unwrap());

        let last = rows.last().unwrap();
        let synthetic = FeatureRow {
            lag1: forecast[0],
            lag3: last.lag1,
            lag6: last.lag3,
            target: None,
            ..*last
        };
        assert_eq!(synthetic.date(), last.date());
        assert_eq!(forecast[1], ensemble.predict(&[synthetic]).unwrap()[0]);
    }

    #[test]
    fn test_minimal_seed_forecast() {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let seed: Vec<Observation> = (0..7)
            .map(|i| Observation::new(start + chrono::Duration::days(i), 10.0 + i as f64))
            .collect();
        let seed_rows = FeaturePipeline::new().build(&seed).unwrap();
        assert_eq!(seed_rows.len(), 1);

        let (ensemble, _) = setup();
        let forecast = ensemble.forecast(&seed_rows, 3).unwrap();
        assert_eq!(forecast.len(), 3);
        assert!(forecast.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_steps_and_bad_seed() {
        let (ensemble, rows) = setup();
        assert!(ensemble.forecast(&rows, 0).unwrap().is_empty());
        assert!(matches!(
            ensemble.forecast(&[], 5),
            Err(ForecastError::Input(_))
        ));

        let mut bad = rows[..LAG_DEPTH].to_vec();
        bad[2].lag6 = f64::INFINITY;
        assert!(matches!(
            ensemble.forecast(&bad, 1),
            Err(ForecastError::Input(_))
        ));
    }

    #[test]
    fn test_last_row_only_matches_full_buffer() {
        let (ensemble, rows) = setup();
        let full = RecursiveForecaster::default()
            .forecast(&ensemble, &rows, 10)
            .unwrap();
        let last_only = RecursiveForecaster::new(ForecastOptions {
            recompute_full_buffer: false,
            ..Default::default()
        })
        .forecast(&ensemble, &rows, 10)
        .unwrap();
        assert_eq!(full, last_only);
    }

    #[test]
    fn test_history_lags_read_realized_values() {
        let date = NaiveDate::from_ymd_opt(2021, 5, 10).unwrap();
        // row j has lag1 = j
        let buffer: Vec<FeatureRow> = (0..8)
            .map(|j| FeatureRow::new(date, j as f64, -1.0, -2.0, None))
            .collect();

        let history = RecursiveForecaster::new(ForecastOptions {
            lag_update: LagUpdate::History,
            ..Default::default()
        });
        let next = history.next_row(&buffer, 99.0).unwrap();
        assert_eq!((next.lag1, next.lag3, next.lag6), (99.0, 6.0, 3.0));

        let cascade = RecursiveForecaster::default().next_row(&buffer, 99.0).unwrap();
        assert_eq!((cascade.lag1, cascade.lag3, cascade.lag6), (99.0, 7.0, -1.0));

        // too short for lag6: falls back to the cascade value
        let short = history.next_row(&buffer[..3], 99.0).unwrap();
        assert_eq!((short.lag3, short.lag6), (1.0, -1.0));
    }

    #[test]
    fn test_history_forecast_runs() {
        let (ensemble, rows) = setup();
        let forecast = RecursiveForecaster::new(ForecastOptions {
            lag_update: LagUpdate::History,
            recompute_full_buffer: false,
        })
        .forecast(&ensemble, &rows, 15)
        .unwrap();
        assert_eq!(forecast.len(), 15);
        assert!(forecast.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_raised_flag_stops_forecast() {
        let (ensemble, rows) = setup();
        let flag = CancelFlag::default();

        let forecaster = RecursiveForecaster::default().with_cancel(Some(Arc::clone(&flag)));
        assert_eq!(forecaster.forecast(&ensemble, &rows, 4).unwrap().len(), 4);

        flag.store(true, Ordering::Relaxed);
        assert!(matches!(
            forecaster.forecast(&ensemble, &rows, 4),
            Err(ForecastError::State(msg)) if msg.contains("cancelled after 0 of 4")
        ));
    }
}
