//! Admin dashboard endpoints under `/api/admin`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::application::dashboard::{AwardPointsCommand, IncidentQuery};
use crate::domain::record::Fields;

use super::AppState;
use super::error::ApiError;

const SOURCE: &str = "infra::http::admin";

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

pub async fn dashboard_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .dashboard
        .dashboard_stats()
        .await
        .map_err(|err| ApiError::from_admin(SOURCE, err))?;
    Ok(Json(stats))
}

pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .dashboard
        .incidents(query)
        .await
        .map_err(|err| ApiError::from_admin(SOURCE, err))?;
    Ok(Json(page))
}

pub async fn update_incident_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .dashboard
        .update_incident_status(&id, &update.status)
        .await
        .map_err(|err| ApiError::from_admin(SOURCE, err))?;
    Ok(Json(record))
}

pub async fn gamification(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .dashboard
        .gamification()
        .await
        .map_err(|err| ApiError::from_admin(SOURCE, err))?;
    Ok(Json(summary))
}

pub async fn award_points(
    State(state): State<AppState>,
    Json(command): Json<AwardPointsCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let award = state
        .dashboard
        .award_points(command)
        .await
        .map_err(|err| ApiError::from_admin(SOURCE, err))?;
    Ok(Json(award))
}

/// Drop every cached read across the opened collections.
pub async fn flush_cache(State(state): State<AppState>) -> impl IntoResponse {
    let removed = state.registry.invalidate_all();
    info!(removed, "flushed collection caches");
    Json(json!({ "success": true, "removed": removed }))
}

/// An unset settings document reads as an empty object.
pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let settings = state
        .dashboard
        .settings()
        .await
        .map_err(|err| ApiError::from_admin(SOURCE, err))?;
    Ok(match settings {
        Some(record) => Json(record).into_response(),
        None => Json(json!({})).into_response(),
    })
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(data): Json<Fields>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .dashboard
        .update_settings(data)
        .await
        .map_err(|err| ApiError::from_admin(SOURCE, err))?;
    Ok(Json(record))
}
