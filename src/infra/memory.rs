//! In-process document store.
//!
//! Used when no database URL is configured and throughout the tests. Values
//! order like a document database: null, booleans, numbers, strings, arrays,
//! then objects.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::application::store::{
    CollectionStore, DocumentQuery, DocumentStore, OrderDirection, StartAfter, StoreError,
};
use crate::domain::record::{Document, Fields};

/// Store entry points, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    Open,
    Query,
    Get,
    Add,
    Set,
    Delete,
    Batch,
    Scan,
    Probe,
}

impl StoreCall {
    const ALL: [StoreCall; 9] = [
        StoreCall::Open,
        StoreCall::Query,
        StoreCall::Get,
        StoreCall::Add,
        StoreCall::Set,
        StoreCall::Delete,
        StoreCall::Batch,
        StoreCall::Scan,
        StoreCall::Probe,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn bit(self) -> u16 {
        1 << self.index()
    }
}

#[derive(Debug, Default)]
struct Instrumentation {
    failing: AtomicU16,
    calls: [AtomicUsize; 9],
}

impl Instrumentation {
    fn enter(&self, call: StoreCall) -> Result<(), StoreError> {
        self.calls[call.index()].fetch_add(1, AtomicOrdering::SeqCst);
        if self.failing.load(AtomicOrdering::SeqCst) & call.bit() != 0 {
            return Err(StoreError::Unavailable(format!(
                "injected failure on {call:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, Arc<MemoryCollection>>,
    instrumentation: Arc<Instrumentation>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`], or stop doing so.
    pub fn set_failing(&self, failing: bool) {
        let mask = if failing { u16::MAX } else { 0 };
        self.instrumentation
            .failing
            .store(mask, AtomicOrdering::SeqCst);
    }

    /// Make one kind of call fail until [`MemoryDocumentStore::clear_failures`].
    pub fn fail_on(&self, call: StoreCall) {
        self.instrumentation
            .failing
            .fetch_or(call.bit(), AtomicOrdering::SeqCst);
    }

    pub fn clear_failures(&self) {
        self.set_failing(false);
    }

    /// Number of calls of one kind across all collections.
    pub fn calls(&self, call: StoreCall) -> usize {
        self.instrumentation.calls[call.index()].load(AtomicOrdering::SeqCst)
    }

    pub fn reset_calls(&self) {
        for call in StoreCall::ALL {
            self.instrumentation.calls[call.index()].store(0, AtomicOrdering::SeqCst);
        }
    }

    /// Write a document directly, bypassing stamping and instrumentation.
    pub async fn seed(&self, collection: &str, document: Document) {
        let handle = self.handle(collection);
        handle
            .documents
            .write()
            .await
            .insert(document.id, document.data);
    }

    /// Read a document directly, bypassing instrumentation.
    pub async fn peek(&self, collection: &str, id: &str) -> Option<Fields> {
        let handle = self.handle(collection);
        let documents = handle.documents.read().await;
        documents.get(id).cloned()
    }

    fn handle(&self, name: &str) -> Arc<MemoryCollection> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCollection {
                    name: name.to_string(),
                    documents: RwLock::new(BTreeMap::new()),
                    instrumentation: Arc::clone(&self.instrumentation),
                })
            })
            .clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn open_collection(&self, name: &str) -> Result<Arc<dyn CollectionStore>, StoreError> {
        self.instrumentation.enter(StoreCall::Open)?;
        let handle: Arc<dyn CollectionStore> = self.handle(name);
        Ok(handle)
    }
}

#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<BTreeMap<String, Fields>>,
    instrumentation: Arc<Instrumentation>,
}

#[async_trait]
impl CollectionStore for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        self.instrumentation.enter(StoreCall::Query)?;
        let documents = self.documents.read().await;

        let mut matches: Vec<(&String, &Value, &Fields)> = documents
            .iter()
            .filter_map(|(id, data)| data.get(&query.order_by).map(|value| (id, value, data)))
            .filter(|(_, _, data)| {
                query.filters.iter().all(|(field, expected)| {
                    data.get(field)
                        .is_some_and(|actual| compare_values(actual, expected) == Ordering::Equal)
                })
            })
            .collect();

        matches.sort_by(|left, right| {
            directed(query.direction, position(left.1, left.0, right.1, right.0))
        });

        let documents = matches
            .into_iter()
            .filter(|(id, value, _)| match &query.start_after {
                Some(StartAfter {
                    value: after_value,
                    id: after_id,
                }) => {
                    directed(query.direction, position(value, id, after_value, after_id))
                        == Ordering::Greater
                }
                None => true,
            })
            .take(query.limit as usize)
            .map(|(id, _, data)| Document::new(id.clone(), data.clone()))
            .collect();
        Ok(documents)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.instrumentation.enter(StoreCall::Get)?;
        let documents = self.documents.read().await;
        Ok(documents
            .get(id)
            .map(|data| Document::new(id, data.clone())))
    }

    async fn add_document(
        &self,
        id: Option<String>,
        payload: Fields,
    ) -> Result<String, StoreError> {
        self.instrumentation.enter(StoreCall::Add)?;
        let id = id.unwrap_or_else(|| self.new_document_id());
        let mut documents = self.documents.write().await;
        if documents.contains_key(&id) {
            return Err(StoreError::Conflict { id });
        }
        documents.insert(id.clone(), payload);
        Ok(id)
    }

    async fn set_document(
        &self,
        id: &str,
        payload: Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.instrumentation.enter(StoreCall::Set)?;
        let mut documents = self.documents.write().await;
        if merge && let Some(existing) = documents.get_mut(id) {
            existing.extend(payload);
            return Ok(());
        }
        documents.insert(id.to_string(), payload);
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), StoreError> {
        self.instrumentation.enter(StoreCall::Delete)?;
        self.documents.write().await.remove(id);
        Ok(())
    }

    async fn batch_write(&self, writes: Vec<(String, Fields)>) -> Result<(), StoreError> {
        self.instrumentation.enter(StoreCall::Batch)?;
        self.documents.write().await.extend(writes);
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<Document>, StoreError> {
        self.instrumentation.enter(StoreCall::Scan)?;
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .map(|(id, data)| Document::new(id.clone(), data.clone()))
            .collect())
    }

    async fn probe(&self) -> Result<(), StoreError> {
        self.instrumentation.enter(StoreCall::Probe)?;
        let _guard = self.documents.read().await;
        Ok(())
    }
}

fn position(value: &Value, id: &str, other_value: &Value, other_id: &str) -> Ordering {
    compare_values(value, other_value).then_with(|| id.cmp(other_id))
}

fn directed(direction: OrderDirection, ordering: Ordering) -> Ordering {
    match direction {
        OrderDirection::Asc => ordering,
        OrderDirection::Desc => ordering.reverse(),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values; numbers compare numerically across int/float.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => {
                let a = a.as_f64().unwrap_or(f64::NAN);
                let b = b.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(a, b)| compare_values(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => {
            let mut a: Vec<_> = a.iter().collect();
            let mut b: Vec<_> = b.iter().collect();
            a.sort_by(|x, y| x.0.cmp(y.0));
            b.sort_by(|x, y| x.0.cmp(y.0));
            a.iter()
                .zip(b.iter())
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_values(va, vb)))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len()))
        }
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}
