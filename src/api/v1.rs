use axum::{routing::get, Router};

use super::{health, lake};
use crate::service::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/lake/history", get(lake::get_history))
        .route("/lake/model", get(lake::get_model))
        .route(
            "/lake/forecast",
            get(lake::get_forecast).post(lake::post_forecast),
        )
        .route("/lake/evaluation", get(lake::get_evaluation))
        .with_state(state)
}
