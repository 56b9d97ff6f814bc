use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::service::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub model_id: String,
    pub observations: usize,
    pub evaluation_cached: bool,
}

/// GET /api/v1/healthz
///
/// The ensemble is trained before the listener binds, so a running server is
/// always able to forecast.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        model_id: state.lake.ensemble().id().to_string(),
        observations: state.lake.observations().len(),
        evaluation_cached: state.lake.cached_evaluation().is_some(),
    };
    (StatusCode::OK, Json(response))
}
