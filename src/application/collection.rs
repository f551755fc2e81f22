//! Cached read/write access to one document collection.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::application::adapter::StoreAdapter;
use crate::application::error::{AccessError, Operation};
use crate::application::pagination::{CursorPage, ListCursor, ListParams, ListQuery};
use crate::application::store::{CollectionStore, DocumentStore, StoreError};
use crate::cache::{CacheConfig, CacheKey, KeyPrefix, SweeperHandle, TtlCache, spawn_sweeper};
use crate::domain::record::{Document, Fields, Record, Stamp, strip_reserved};
use crate::domain::stats::AggregateStats;

/// Value stored in a collection's read cache.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Page(CursorPage<Record>),
    Record(Record),
    Stats(AggregateStats),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

/// Access layer for one collection: store adapter plus its own read cache.
///
/// Reads are served from the cache while fresh. Every write attempt that
/// reaches the store evicts the collection's list and stats entries, and the
/// point entry of the written id, before returning.
pub struct CollectionService {
    name: String,
    adapter: StoreAdapter,
    cache: Option<Arc<TtlCache<CachedValue>>>,
    _sweeper: Option<SweeperHandle>,
}

impl fmt::Debug for CollectionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionService")
            .field("name", &self.name)
            .field("cache_enabled", &self.cache.is_some())
            .finish()
    }
}

impl CollectionService {
    pub fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>, config: &CacheConfig) -> Self {
        let name = name.into();
        let (cache, sweeper) = if config.enabled {
            let cache = Arc::new(TtlCache::new(name.clone(), config.ttl()));
            let sweeper = spawn_sweeper(&cache, config.sweep_interval());
            (Some(cache), sweeper)
        } else {
            (None, None)
        };

        Self {
            adapter: StoreAdapter::new(store, name.clone()),
            name,
            cache,
            _sweeper: sweeper,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of cache entries currently held, expired ones included.
    pub fn cached_entries(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.len())
    }

    #[instrument(skip(self, params), fields(collection = %self.name))]
    pub async fn list(&self, params: ListParams) -> Result<CursorPage<Record>, AccessError> {
        let query = params.normalize()?;
        let key = CacheKey::list(&self.name, &query);
        if let Some(CachedValue::Page(page)) = self.cached(&key) {
            return Ok(page);
        }

        let generation = self.generation();
        let handle = self.open(Operation::List).await?;
        let documents = handle
            .query(&query.to_document_query())
            .await
            .map_err(|err| self.fail(Operation::List, err))?;

        let items: Vec<Record> = documents.into_iter().map(Record::from_document).collect();
        let next_cursor = next_cursor(&query, &items)?;
        let page = CursorPage::new(items, next_cursor);
        debug!(returned = page.items.len(), "listed documents");

        self.populate(&key, CachedValue::Page(page.clone()), generation);
        Ok(page)
    }

    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Record>, AccessError> {
        let id = require_id(id)?;
        let key = CacheKey::get_by_id(&self.name, id);
        if let Some(CachedValue::Record(record)) = self.cached(&key) {
            return Ok(Some(record));
        }

        let generation = self.generation();
        let handle = self.open(Operation::GetById).await?;
        let document = handle
            .get_document(id)
            .await
            .map_err(|err| self.fail(Operation::GetById, err))?;

        let Some(document) = document else {
            return Ok(None);
        };
        let record = Record::from_document(document);
        self.populate(&key, CachedValue::Record(record.clone()), generation);
        Ok(Some(record))
    }

    /// Insert a document under a store-assigned id and return it as stored.
    #[instrument(skip(self, data), fields(collection = %self.name))]
    pub async fn create(&self, data: Fields) -> Result<Record, AccessError> {
        self.insert(None, data).await
    }

    /// Insert a document under `id`; an existing `id` is a conflict.
    #[instrument(skip(self, data), fields(collection = %self.name))]
    pub async fn create_with_id(&self, id: &str, data: Fields) -> Result<Record, AccessError> {
        let id = require_id(id)?;
        self.insert(Some(id.to_string()), data).await
    }

    /// Merge `data` into the document, creating it when missing.
    #[instrument(skip(self, data), fields(collection = %self.name))]
    pub async fn update(&self, id: &str, data: Fields) -> Result<Record, AccessError> {
        let id = require_id(id)?;
        let payload = Stamp::now().apply_update(strip_reserved(data));
        let handle = self.open(Operation::Update).await?;

        let result = async {
            handle.set_document(id, payload, true).await?;
            read_back(handle.as_ref(), id).await
        }
        .await;

        self.invalidate_after_write(Some(id));
        result.map_err(|err| self.fail(Operation::Update, err))
    }

    /// Delete the document; deleting a missing id succeeds.
    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn remove(&self, id: &str) -> Result<String, AccessError> {
        let id = require_id(id)?;
        let handle = self.open(Operation::Remove).await?;
        let result = handle.delete_document(id).await;

        self.invalidate_after_write(Some(id));
        result.map_err(|err| self.fail(Operation::Remove, err))?;
        Ok(id.to_string())
    }

    /// Insert every item in one atomic write.
    ///
    /// All items share one timestamp. The returned records are built from the
    /// written payloads; unlike [`CollectionService::create`] nothing is read
    /// back from the store.
    #[instrument(skip(self, items), fields(collection = %self.name, items = items.len()))]
    pub async fn batch_create(&self, items: Vec<Fields>) -> Result<Vec<Record>, AccessError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let stamp = Stamp::now();
        let handle = self.open(Operation::BatchCreate).await?;
        let writes: Vec<(String, Fields)> = items
            .into_iter()
            .map(|item| {
                (
                    handle.new_document_id(),
                    stamp.apply_create(strip_reserved(item)),
                )
            })
            .collect();
        let records = writes
            .iter()
            .map(|(id, payload)| Record::from_document(Document::new(id.clone(), payload.clone())))
            .collect();

        let result = handle.batch_write(writes).await;
        self.invalidate_after_write(None);
        result.map_err(|err| self.fail(Operation::BatchCreate, err))?;
        Ok(records)
    }

    /// Full-scan statistics of the collection.
    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn get_aggregated_stats(&self) -> Result<AggregateStats, AccessError> {
        let key = CacheKey::stats(&self.name);
        if let Some(CachedValue::Stats(stats)) = self.cached(&key) {
            return Ok(stats);
        }

        let generation = self.generation();
        let handle = self.open(Operation::AggregateStats).await?;
        let documents = handle
            .scan_all()
            .await
            .map_err(|err| self.fail(Operation::AggregateStats, err))?;

        let records: Vec<Record> = documents.into_iter().map(Record::from_document).collect();
        let stats = AggregateStats::from_records(&records, OffsetDateTime::now_utc());
        debug!(total = stats.total, "aggregated collection stats");

        self.populate(&key, CachedValue::Stats(stats.clone()), generation);
        Ok(stats)
    }

    /// Bounded liveness probe; never fails and never touches the cache.
    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn health_check(&self) -> HealthStatus {
        let outcome = match self.adapter.open().await {
            Ok(handle) => handle.probe().await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => HealthStatus {
                status: HealthState::Healthy,
                collection: self.name.clone(),
                error: None,
            },
            Err(err) => {
                warn!(error = %err, "collection health check failed");
                HealthStatus {
                    status: HealthState::Unhealthy,
                    collection: self.name.clone(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Drop every cached entry of this collection.
    pub fn invalidate_all(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.clear())
    }

    async fn insert(&self, id: Option<String>, data: Fields) -> Result<Record, AccessError> {
        let payload = Stamp::now().apply_create(strip_reserved(data));
        let handle = self.open(Operation::Create).await?;

        let result = async {
            let id = handle.add_document(id, payload).await?;
            read_back(handle.as_ref(), &id).await
        }
        .await;

        self.invalidate_after_write(None);
        result.map_err(|err| self.fail(Operation::Create, err))
    }

    async fn open(&self, operation: Operation) -> Result<Arc<dyn CollectionStore>, AccessError> {
        self.adapter
            .open()
            .await
            .map_err(|err| self.fail(operation, err))
    }

    fn fail(&self, operation: Operation, err: StoreError) -> AccessError {
        warn!(
            collection = %self.name,
            operation = %operation,
            error = %err,
            "store operation failed"
        );
        AccessError::store(&self.name, operation, err)
    }

    fn cached(&self, key: &CacheKey) -> Option<CachedValue> {
        self.cache.as_ref().and_then(|cache| cache.get(key))
    }

    fn generation(&self) -> u64 {
        self.cache.as_ref().map_or(0, |cache| cache.generation())
    }

    fn populate(&self, key: &CacheKey, value: CachedValue, generation: u64) {
        if let Some(cache) = &self.cache {
            cache.set_if_generation(key, value, generation);
        }
    }

    fn invalidate_after_write(&self, id: Option<&str>) {
        let Some(cache) = &self.cache else {
            return;
        };
        let mut removed = cache.delete_by_prefix(&KeyPrefix::lists(&self.name));
        removed += cache.delete_by_prefix(&KeyPrefix::stats(&self.name));
        if let Some(id) = id {
            removed += usize::from(cache.delete(&CacheKey::get_by_id(&self.name, id)));
        }
        debug!(collection = %self.name, removed, "invalidated cached reads");
    }
}

fn require_id(id: &str) -> Result<&str, AccessError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AccessError::validation("document id must not be empty"));
    }
    Ok(trimmed)
}

async fn read_back(handle: &dyn CollectionStore, id: &str) -> Result<Record, StoreError> {
    handle
        .get_document(id)
        .await?
        .map(Record::from_document)
        .ok_or_else(|| StoreError::integrity(format!("document `{id}` missing after write")))
}

fn next_cursor(query: &ListQuery, items: &[Record]) -> Result<Option<String>, AccessError> {
    if items.len() < query.limit as usize {
        return Ok(None);
    }
    let Some(last) = items.last() else {
        return Ok(None);
    };
    let Some(value) = last.sort_value(&query.order_by) else {
        return Ok(None);
    };
    let cursor = ListCursor::new(query.order_by.clone(), value, last.id.clone()).encode()?;
    Ok(Some(cursor))
}
