use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    domain::{LakeForecast, Observation},
    forecast::CancelFlag,
    ml::{EvaluationReport, TrainingSummary},
    service::AppState,
};

type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// Raises its flag when dropped. A handler future dropped by the timeout
/// layer thereby stops the blocking forecast it started.
struct CancelOnDrop(CancelFlag);

impl CancelOnDrop {
    fn new() -> Self {
        Self(CancelFlag::default())
    }

    fn flag(&self) -> Option<CancelFlag> {
        Some(Arc::clone(&self.0))
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub steps: Option<usize>,
}

/// Body of `POST /lake/forecast`: a series to train on and the horizon.
#[derive(Debug, Deserialize, Validate)]
pub struct ForecastRequest {
    #[validate(length(min = 1, message = "at least one observation is required"))]
    pub observations: Vec<Observation>,
    #[validate(range(min = 1, message = "steps must be at least 1"))]
    pub steps: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForecastResponse {
    #[serde(flatten)]
    pub forecast: LakeForecast,
    pub average_level: Option<f64>,
    pub min_level: Option<f64>,
    pub max_level: Option<f64>,
}

impl From<LakeForecast> for ForecastResponse {
    fn from(forecast: LakeForecast) -> Self {
        Self {
            average_level: forecast.average_level(),
            min_level: forecast.min_level(),
            max_level: forecast.max_level(),
            forecast,
        }
    }
}

/// GET /api/v1/lake/history - Observed lake levels
pub async fn get_history(State(state): State<AppState>) -> ApiResult<Vec<Observation>> {
    let history = state.lake.observations().to_vec();
    let count = history.len();
    Ok(ApiResponse::success(history).with_count(count))
}

/// GET /api/v1/lake/model - What the startup ensemble learned
pub async fn get_model(State(state): State<AppState>) -> ApiResult<TrainingSummary> {
    Ok(ApiResponse::success(state.lake.summary().clone()))
}

/// GET /api/v1/lake/forecast?steps=N - Roll the startup ensemble forward
pub async fn get_forecast(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<ForecastResponse> {
    let started = Instant::now();
    let steps = query.steps.unwrap_or(state.cfg.forecast.default_steps);
    state.lake.check_steps(steps)?;

    let lake = state.lake.clone();
    let guard = CancelOnDrop::new();
    let cancel = guard.flag();
    let forecast = tokio::task::spawn_blocking(move || lake.forecast(steps, cancel)).await??;

    tracing::info!(steps, model_id = %forecast.model_id, "served lake forecast");
    Ok(ApiResponse::success(ForecastResponse::from(forecast))
        .with_duration(started.elapsed().as_millis() as u64))
}

/// POST /api/v1/lake/forecast - Train on the supplied series, then forecast
pub async fn post_forecast(
    State(state): State<AppState>,
    Json(request): Json<ForecastRequest>,
) -> ApiResult<ForecastResponse> {
    let started = Instant::now();
    request.validate()?;
    let steps = request.steps.unwrap_or(state.cfg.forecast.default_steps);
    state.lake.check_steps(steps)?;

    let lake = state.lake.clone();
    let guard = CancelOnDrop::new();
    let cancel = guard.flag();
    let forecast = tokio::task::spawn_blocking(move || {
        lake.forecast_series(&request.observations, steps, cancel)
    })
    .await??;

    tracing::info!(steps, model_id = %forecast.model_id, "served ad-hoc lake forecast");
    Ok(ApiResponse::success(ForecastResponse::from(forecast))
        .with_duration(started.elapsed().as_millis() as u64))
}

/// GET /api/v1/lake/evaluation - Hold-out scores of each model
pub async fn get_evaluation(State(state): State<AppState>) -> ApiResult<EvaluationReport> {
    let started = Instant::now();
    let report = state.lake.evaluation().await?;
    Ok(ApiResponse::success(report).with_duration(started.elapsed().as_millis() as u64))
}
