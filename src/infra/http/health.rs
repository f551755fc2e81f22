use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;

use super::AppState;

pub async fn health(State(state): State<AppState>) -> Response {
    let status = state.registry.health_check().await;
    if status.is_healthy() {
        return (StatusCode::OK, Json(status)).into_response();
    }

    let detail = status
        .error
        .clone()
        .unwrap_or_else(|| "store unhealthy".to_string());
    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response();
    ErrorReport::from_message("infra::http::health", StatusCode::SERVICE_UNAVAILABLE, detail)
        .attach(&mut response);
    response
}
