use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use docdash::application::registry::CollectionRegistry;
use docdash::cache::CacheConfig;
use docdash::infra::http::{AppState, build_router};
use docdash::infra::memory::{MemoryDocumentStore, StoreCall};

fn app() -> (Arc<MemoryDocumentStore>, Router) {
    let store = Arc::new(MemoryDocumentStore::new());
    let registry = Arc::new(CollectionRegistry::with_defaults(
        store.clone(),
        CacheConfig::default(),
    ));
    (store, build_router(AppState::new(registry)))
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router responds");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn document_crud_round_trip() {
    let (_store, router) = app();

    let (status, created) = send(
        &router,
        Method::POST,
        "/api/users",
        Some(json!({ "name": "Ada", "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().expect("id assigned").to_string();
    assert!(created["createdAt"].is_string());

    let (status, fetched) = send(&router, Method::GET, &format!("/api/users/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Ada");

    let (status, updated) = send(
        &router,
        Method::PUT,
        &format!("/api/users/{id}"),
        Some(json!({ "role": "owner" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Ada");
    assert_eq!(updated["role"], "owner");

    let (status, _) = send(&router, Method::DELETE, &format!("/api/users/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, Method::GET, &format!("/api/users/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn list_applies_query_filters() {
    let (_store, router) = app();
    let (status, _) = send(
        &router,
        Method::POST,
        "/api/incidents/batch",
        Some(json!([
            { "type": "spill", "status": "new" },
            { "type": "fire", "status": "new" },
            { "type": "spill", "status": "resolved" }
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, page) = send(
        &router,
        Method::GET,
        "/api/incidents?type=spill&limit=10",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(page["next_cursor"], Value::Null);

    let (status, stats) = send(&router, Method::GET, "/api/incidents/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["byType"]["spill"], 2);
}

#[tokio::test]
async fn bad_requests_map_to_400_without_store_access() {
    let (store, router) = app();

    let (status, body) = send(&router, Method::GET, "/api/users?cursor=garbage", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());

    let (status, _) = send(&router, Method::GET, "/api/users?limit=5000", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, Method::GET, "/api/secrets", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(store.calls(StoreCall::Query), 0);
}

#[tokio::test]
async fn unavailable_store_maps_to_503() {
    let (store, router) = app();
    store.fail_on(StoreCall::Query);

    let (status, body) = send(&router, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn health_reflects_store_state() {
    let (store, router) = app();

    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["collection"], "health_check");

    store.set_failing(true);
    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn admin_settings_default_to_empty_object() {
    let (_store, router) = app();

    let (status, body) = send(&router, Method::GET, "/api/admin/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, _) = send(
        &router,
        Method::PUT,
        "/api/admin/settings",
        Some(json!({ "theme": "dark" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, Method::GET, "/api/admin/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "default");
    assert_eq!(body["theme"], "dark");
}

#[tokio::test]
async fn admin_incident_workflow() {
    let (_store, router) = app();
    let (_, created) = send(
        &router,
        Method::POST,
        "/api/incidents",
        Some(json!({ "type": "spill", "status": "new" })),
    )
    .await;
    let id = created["id"].as_str().expect("id").to_string();

    let (status, stats) = send(&router, Method::GET, "/api/admin/dashboard/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["pendingReports"], 1);

    let (status, _) = send(
        &router,
        Method::PUT,
        &format!("/api/admin/incidents/{id}/status"),
        Some(json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, stats) = send(&router, Method::GET, "/api/admin/dashboard/stats", None).await;
    assert_eq!(stats["resolvedReports"], 1);
    assert_eq!(stats["pendingReports"], 0);

    let (status, page) = send(
        &router,
        Method::GET,
        "/api/admin/incidents?status=resolved",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["incidents"].as_array().map(Vec::len), Some(1));
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn award_points_for_unknown_user_is_404() {
    let (_store, router) = app();
    let (status, body) = send(
        &router,
        Method::POST,
        "/api/admin/gamification/award-points",
        Some(json!({ "userId": "ghost", "points": 10, "reason": "help" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/admin/gamification/award-points",
        Some(json!({ "userId": "ghost", "points": 5000, "reason": "help" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_flush_forces_the_next_read_to_the_store() {
    let (store, router) = app();
    let (status, _) = send(&router, Method::POST, "/api/users", Some(json!({ "name": "Ada" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    send(&router, Method::GET, "/api/users", None).await;
    send(&router, Method::GET, "/api/users", None).await;
    assert_eq!(store.calls(StoreCall::Query), 1);

    let (status, body) = send(&router, Method::POST, "/api/admin/cache/flush", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["removed"], 1);

    let (status, body) = send(&router, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.calls(StoreCall::Query), 2);
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
}
