//! Generic collection endpoints under `/api/{collection}`.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::Value;

use crate::application::pagination::ListParams;
use crate::application::store::OrderDirection;
use crate::domain::record::Fields;

use super::AppState;
use super::error::ApiError;

const SOURCE: &str = "infra::http::collections";

pub async fn list_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let params = list_params(query)?;
    let service = state.collection(&collection, SOURCE)?;
    let page = service
        .list(params)
        .await
        .map_err(|err| ApiError::from_access(SOURCE, err))?;
    Ok(Json(page))
}

pub async fn create_document(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(data): Json<Fields>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.collection(&collection, SOURCE)?;
    let record = service
        .create(data)
        .await
        .map_err(|err| ApiError::from_access(SOURCE, err))?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn batch_create_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(items): Json<Vec<Fields>>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.collection(&collection, SOURCE)?;
    let records = service
        .batch_create(items)
        .await
        .map_err(|err| ApiError::from_access(SOURCE, err))?;
    Ok((StatusCode::CREATED, Json(records)))
}

pub async fn collection_stats(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.collection(&collection, SOURCE)?;
    let stats = service
        .get_aggregated_stats()
        .await
        .map_err(|err| ApiError::from_access(SOURCE, err))?;
    Ok(Json(stats))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.collection(&collection, SOURCE)?;
    let record = service
        .get_by_id(&id)
        .await
        .map_err(|err| ApiError::from_access(SOURCE, err))?
        .ok_or_else(|| ApiError::not_found(SOURCE, format!("document `{id}` not found")))?;
    Ok(Json(record))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(data): Json<Fields>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.collection(&collection, SOURCE)?;
    let record = service
        .update(&id, data)
        .await
        .map_err(|err| ApiError::from_access(SOURCE, err))?;
    Ok(Json(record))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.collection(&collection, SOURCE)?;
    service
        .remove(&id)
        .await
        .map_err(|err| ApiError::from_access(SOURCE, err))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reserved query keys drive paging; every other key is a string equality filter.
fn list_params(mut query: HashMap<String, String>) -> Result<ListParams, ApiError> {
    let mut params = ListParams::new();

    if let Some(raw) = query.remove("limit") {
        let limit = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ApiError::bad_request(SOURCE, format!("invalid limit `{raw}`")))?;
        params = params.limit(limit);
    }
    if let Some(cursor) = query.remove("cursor").filter(|value| !value.is_empty()) {
        params = params.cursor(cursor);
    }
    let direction = query
        .remove("order_direction")
        .map(|raw| raw.parse::<OrderDirection>())
        .transpose()
        .map_err(|reason| ApiError::bad_request(SOURCE, reason))?;
    params.order_by = query.remove("order_by").filter(|value| !value.is_empty());
    params.order_direction = direction;

    for (field, value) in query {
        params = params.filter(field, Value::String(value));
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn paging_keys_are_not_filters() {
        let params = list_params(query(&[
            ("limit", "10"),
            ("order_by", "priority"),
            ("order_direction", "asc"),
            ("status", "open"),
        ]))
        .expect("valid query");

        assert_eq!(params.limit, Some(10));
        assert_eq!(params.order_by.as_deref(), Some("priority"));
        assert_eq!(params.order_direction, Some(OrderDirection::Asc));
        assert_eq!(params.filters.len(), 1);
        assert_eq!(params.filters["status"], Value::String("open".into()));
    }

    #[test]
    fn malformed_limit_and_direction_are_rejected() {
        let err = list_params(query(&[("limit", "ten")])).expect_err("bad limit");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = list_params(query(&[("order_direction", "up")])).expect_err("bad direction");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
