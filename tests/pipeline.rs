//! End-to-end: CSV -> features -> stacked ensemble -> recursive forecast.

mod common;

use std::io::Write;

use chrono::NaiveDate;
use kariba_forecaster::domain::{LakeForecast, LAG_DEPTH};
use kariba_forecaster::forecast::{FeaturePipeline, ForecastOptions, LagUpdate, RecursiveForecaster};
use kariba_forecaster::ingest::load_observations;
use kariba_forecaster::ml::{EnsembleForecaster, EnsembleTrainer, ModelType};
use kariba_forecaster::ForecastError;
use rstest::rstest;

#[test]
fn test_csv_to_forecast() {
    let series = common::default_series();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "date,Target_height_variation").unwrap();
    for obs in &series {
        writeln!(file, "{},{}", obs.date.format("%Y-%m-%d"), obs.value).unwrap();
    }
    file.flush().unwrap();

    let observations = load_observations(file.path(), "date", "Target_height_variation").unwrap();
    assert_eq!(observations.len(), series.len());

    let rows = FeaturePipeline::new().build(&observations).unwrap();
    assert_eq!(rows.len(), series.len() - LAG_DEPTH);

    let cfg = common::test_config();
    let mut forecaster = EnsembleForecaster::new(cfg.ensemble.clone());
    let ensemble = forecaster.fit(&rows).unwrap();
    let values = forecaster.forecast(&rows, 30).unwrap();
    assert_eq!(values.len(), 30);

    let last = observations.last().unwrap().date;
    let forecast = LakeForecast::from_values(last, &values, ensemble.id().to_string());
    assert_eq!(forecast.points[0].date, last.succ_opt().unwrap());
    assert_eq!(forecast.horizon_days(), 30);

    // levels stay within a sane band around the observed range
    let (lo, hi) = (460.0, 500.0);
    assert!(values.iter().all(|v| *v > lo && *v < hi), "{:?}", values);
}

#[test]
fn test_forecast_is_reproducible() {
    let rows = FeaturePipeline::new().build(&common::default_series()).unwrap();
    let trainer = EnsembleTrainer::new(common::test_config().ensemble);

    let a = trainer.fit(&rows).unwrap().forecast(&rows, 20).unwrap();
    let b = trainer.fit(&rows).unwrap().forecast(&rows, 20).unwrap();
    assert_eq!(a, b);
}

#[rstest]
#[case(LagUpdate::Cascade, true)]
#[case(LagUpdate::Cascade, false)]
#[case(LagUpdate::History, true)]
#[case(LagUpdate::History, false)]
fn test_forecast_options(#[case] lag_update: LagUpdate, #[case] recompute_full_buffer: bool) {
    let rows = FeaturePipeline::new().build(&common::default_series()).unwrap();
    let ensemble = EnsembleTrainer::new(common::test_config().ensemble)
        .fit(&rows)
        .unwrap();

    let options = ForecastOptions {
        lag_update,
        recompute_full_buffer,
    };
    let values = RecursiveForecaster::new(options)
        .forecast(&ensemble, &rows, 12)
        .unwrap();
    assert_eq!(values.len(), 12);
    assert!(values.iter().all(|v| v.is_finite()));

    // the first step only depends on the seed, never on the lag rule
    assert_eq!(values[0], *ensemble.predict(&rows).unwrap().last().unwrap());
}

#[test]
fn test_short_series_is_rejected() {
    let short = common::lake_series(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), LAG_DEPTH);
    let rows = FeaturePipeline::new().build(&short).unwrap();
    assert!(rows.is_empty());

    let mut forecaster = EnsembleForecaster::new(common::test_config().ensemble);
    assert!(matches!(
        forecaster.fit(&rows),
        Err(ForecastError::InsufficientData { .. })
    ));
    assert!(!forecaster.is_trained());
}

#[test]
fn test_unordered_series_is_rejected() {
    let mut series = common::default_series();
    series.swap(10, 11);
    assert!(matches!(
        FeaturePipeline::new().build(&series),
        Err(ForecastError::Data(_))
    ));
}

#[test]
fn test_holdout_evaluation() {
    let rows = FeaturePipeline::new().build(&common::default_series()).unwrap();
    let report = EnsembleTrainer::new(common::test_config().ensemble)
        .evaluate_holdout(&rows, 0.2, 42)
        .unwrap();

    assert_eq!(report.train_rows + report.test_rows, rows.len());
    assert_eq!(report.test_rows, (rows.len() as f64 * 0.2).ceil() as usize);

    let forest = report.score(ModelType::RandomForest).unwrap();
    assert!(forest.rmse >= 0.0);
    assert!((forest.rmse - forest.mse.sqrt()).abs() < 1e-12);
    assert!(report.score(ModelType::StackedEnsemble).is_some());
}
