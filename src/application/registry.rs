use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::application::collection::{CollectionService, HealthStatus};
use crate::application::error::AccessError;
use crate::application::store::DocumentStore;
use crate::cache::CacheConfig;

/// Collection probed by the service health endpoint.
pub const HEALTH_COLLECTION: &str = "health_check";

pub const DEFAULT_COLLECTIONS: [&str; 6] = [
    "users",
    "incidents",
    "gamification",
    "settings",
    "leaderboard",
    "point_awards",
];

/// One shared [`CollectionService`] per allowed collection name.
pub struct CollectionRegistry {
    store: Arc<dyn DocumentStore>,
    cache: CacheConfig,
    allowed: BTreeSet<String>,
    services: DashMap<String, Arc<CollectionService>>,
    health: CollectionService,
}

impl CollectionRegistry {
    pub fn new<I, S>(store: Arc<dyn DocumentStore>, cache: CacheConfig, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let health_cache = CacheConfig {
            enabled: false,
            ..cache.clone()
        };
        let health = CollectionService::new(Arc::clone(&store), HEALTH_COLLECTION, &health_cache);

        Self {
            store,
            cache,
            allowed: allowed.into_iter().map(Into::into).collect(),
            services: DashMap::new(),
            health,
        }
    }

    /// Registry serving the default collection set.
    pub fn with_defaults(store: Arc<dyn DocumentStore>, cache: CacheConfig) -> Self {
        Self::new(store, cache, DEFAULT_COLLECTIONS)
    }

    pub fn collection(&self, name: &str) -> Result<Arc<CollectionService>, AccessError> {
        validate_collection_name(name)?;
        if !self.allowed.contains(name) {
            return Err(AccessError::validation(format!(
                "collection `{name}` is not available"
            )));
        }

        if let Some(service) = self.services.get(name) {
            return Ok(Arc::clone(service.value()));
        }

        let service = self
            .services
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(collection = name, "initialising collection service");
                Arc::new(CollectionService::new(
                    Arc::clone(&self.store),
                    name,
                    &self.cache,
                ))
            })
            .clone();
        Ok(service)
    }

    pub async fn health_check(&self) -> HealthStatus {
        self.health.health_check().await
    }

    /// Drop the cached reads of every collection opened so far.
    pub fn invalidate_all(&self) -> usize {
        self.services
            .iter()
            .map(|entry| entry.value().invalidate_all())
            .sum()
    }
}

pub fn validate_collection_name(name: &str) -> Result<(), AccessError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(AccessError::validation(format!(
            "invalid collection name `{name}`"
        )))
    }
}
