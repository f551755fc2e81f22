mod admin;
mod collections;
pub mod error;
mod health;
mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::application::collection::CollectionService;
use crate::application::dashboard::AdminDashboardService;
use crate::application::registry::CollectionRegistry;

pub use error::ApiError;
pub use middleware::{RequestContext, log_responses, set_request_context};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CollectionRegistry>,
    pub dashboard: AdminDashboardService,
}

impl AppState {
    pub fn new(registry: Arc<CollectionRegistry>) -> Self {
        Self {
            dashboard: AdminDashboardService::new(Arc::clone(&registry)),
            registry,
        }
    }

    fn collection(
        &self,
        name: &str,
        source: &'static str,
    ) -> Result<Arc<CollectionService>, ApiError> {
        self.registry
            .collection(name)
            .map_err(|err| ApiError::from_access(source, err))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/admin/dashboard/stats", get(admin::dashboard_stats))
        .route("/api/admin/incidents", get(admin::list_incidents))
        .route(
            "/api/admin/incidents/{id}/status",
            put(admin::update_incident_status),
        )
        .route("/api/admin/cache/flush", post(admin::flush_cache))
        .route("/api/admin/gamification", get(admin::gamification))
        .route(
            "/api/admin/gamification/award-points",
            post(admin::award_points),
        )
        .route(
            "/api/admin/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        .route(
            "/api/{collection}",
            get(collections::list_documents).post(collections::create_document),
        )
        .route(
            "/api/{collection}/batch",
            post(collections::batch_create_documents),
        )
        .route("/api/{collection}/stats", get(collections::collection_stats))
        .route(
            "/api/{collection}/{id}",
            get(collections::get_document)
                .put(collections::update_document)
                .delete(collections::delete_document),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
