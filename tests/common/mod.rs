#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use kariba_forecaster::config::Config;
use kariba_forecaster::domain::Observation;
use kariba_forecaster::ml::{BoostingParams, EnsembleParams, ForestParams, SvrParams};
use kariba_forecaster::service::{AppState, LakeService};

/// Daily series with a yearly swing and a slow drift, like reservoir levels.
pub fn lake_series(start: NaiveDate, days: usize) -> Vec<Observation> {
    start
        .iter_days()
        .take(days)
        .enumerate()
        .map(|(i, date)| {
            let t = i as f64;
            let level = 480.0 + 2.5 * (t * std::f64::consts::TAU / 365.0).sin() - 0.002 * t
                + 0.3 * (t / 7.0).cos();
            Observation::new(date, level)
        })
        .collect()
}

pub fn default_series() -> Vec<Observation> {
    lake_series(NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(), 160)
}

/// Full stack with small tree counts so tests stay fast.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.ensemble = EnsembleParams {
        forest: ForestParams {
            n_trees: 12,
            max_depth: Some(8),
            seed: 42,
        },
        boosting: BoostingParams {
            n_trees: 30,
            max_depth: 3,
            learning_rate: 0.1,
        },
        svr: SvrParams::default(),
    };
    cfg.forecast.max_steps = 400;
    cfg.server.request_timeout_secs = 30;
    cfg
}

pub fn test_state() -> AppState {
    let cfg = Arc::new(test_config());
    let lake = LakeService::train(Arc::clone(&cfg), default_series()).unwrap();
    AppState::from_service(cfg, lake)
}
