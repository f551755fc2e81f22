//! Store traits describing the backing document database.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::record::{Document, Fields};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("document `{id}` already exists")]
    Conflict { id: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("store timeout")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn from_persistence(err: impl fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            other => Err(format!("unknown order direction `{other}`")),
        }
    }
}

/// Exclusive lower bound of a page in (order value, document id) space.
#[derive(Debug, Clone, PartialEq)]
pub struct StartAfter {
    pub value: Value,
    pub id: String,
}

/// Ordered, filtered, bounded read of one collection.
///
/// Documents without the `order_by` field are never returned. Filters are
/// conjunctive equality predicates. Ties on the order value fall back to the
/// store's native order, which for the bundled stores is the document id.
/// Ordering across value types is store-specific: the memory store sorts
/// null, booleans, numbers, strings, arrays, objects, while Postgres `jsonb`
/// sorts null, strings, numbers, booleans, arrays, objects, with an empty
/// array before null. Paging over a mixed-type field differs between them.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub order_by: String,
    pub direction: OrderDirection,
    pub filters: Vec<(String, Value)>,
    pub limit: u32,
    pub start_after: Option<StartAfter>,
}

/// Handle to one logical collection in the backing store.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    fn name(&self) -> &str;

    /// Allocate an identifier for a document that is about to be written.
    fn new_document_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Insert a new document, returning its identifier. Fails with
    /// [`StoreError::Conflict`] when a caller-supplied id already exists.
    async fn add_document(&self, id: Option<String>, payload: Fields)
    -> Result<String, StoreError>;

    /// Write a document. With `merge`, supplied fields overwrite and all other
    /// fields are kept; a missing document is created.
    async fn set_document(&self, id: &str, payload: Fields, merge: bool)
    -> Result<(), StoreError>;

    /// Delete a document; deleting a missing document succeeds.
    async fn delete_document(&self, id: &str) -> Result<(), StoreError>;

    /// Write every document or none of them.
    async fn batch_write(&self, writes: Vec<(String, Fields)>) -> Result<(), StoreError>;

    async fn scan_all(&self) -> Result<Vec<Document>, StoreError>;

    /// Bounded read of at most one document, used by liveness probes.
    async fn probe(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn open_collection(&self, name: &str) -> Result<Arc<dyn CollectionStore>, StoreError>;
}
