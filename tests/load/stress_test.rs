//! Load testing for the forecasting service
//!
//! - Health checks stay responsive while long forecasts run on the blocking pool
//! - Concurrent evaluation requests share one hold-out computation
//! - Forecast throughput on the trained startup ensemble

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tower::ServiceExt;

use kariba_forecaster::api;

use crate::common;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Test: health check latency while forecast requests are in flight
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_health_latency_under_forecast_load() {
    let state = common::test_state();
    let app = api::router(state.clone(), &state.cfg);

    let latency_measurements = Arc::new(RwLock::new(Vec::new()));

    let mut forecast_tasks = JoinSet::new();
    for _ in 0..8 {
        let app = app.clone();
        forecast_tasks.spawn(async move {
            let response = app.oneshot(get("/api/v1/lake/forecast?steps=365")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        });
    }

    let health_app = app.clone();
    let latency_clone = Arc::clone(&latency_measurements);
    let health_loop = tokio::spawn(async move {
        for _ in 0..20 {
            let start = Instant::now();
            let response = health_app.clone().oneshot(get("/api/v1/healthz")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            latency_clone.write().await.push(start.elapsed());

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    while forecast_tasks.join_next().await.is_some() {}
    health_loop.await.unwrap();

    let measurements = latency_measurements.read().await;
    let max_latency = measurements.iter().max().unwrap();
    println!("Health check latency under load - Max: {:?}", max_latency);

    assert!(
        *max_latency < Duration::from_millis(500),
        "Health check latency exceeded 500ms: {:?}",
        max_latency
    );
}

/// Test: concurrent evaluation requests agree with each other
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_concurrent_evaluation_is_computed_once() {
    let state = common::test_state();
    let mut tasks = JoinSet::new();

    for _ in 0..10 {
        let lake = Arc::clone(&state.lake);
        tasks.spawn(async move { lake.evaluation().await.unwrap() });
    }

    let mut reports = Vec::new();
    while let Some(report) = tasks.join_next().await {
        reports.push(report.unwrap());
    }

    let first = reports[0].meta_weights.clone();
    assert!(reports.iter().all(|r| r.meta_weights == first));
    assert!(state.lake.cached_evaluation().is_some());
}

/// Test: forecast throughput
///
/// Measures how many 30-day forecasts the startup ensemble serves per second.
#[tokio::test]
#[ignore] // Ignore by default as this is a slow test
async fn test_forecast_throughput() {
    let state = common::test_state();

    let start = Instant::now();
    let test_duration = Duration::from_secs(5);
    let mut forecast_count = 0;

    while start.elapsed() < test_duration {
        let forecast = state.lake.forecast(30, None).unwrap();
        assert_eq!(forecast.horizon_days(), 30);
        forecast_count += 1;
    }

    let elapsed = start.elapsed();
    let per_second = forecast_count as f64 / elapsed.as_secs_f64();
    println!(
        "Throughput: {:.1} forecasts/second ({} in {:?})",
        per_second, forecast_count, elapsed
    );

    assert!(per_second > 1.0, "Throughput too low: {:.1}/s", per_second);
}
