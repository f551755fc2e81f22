use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::application::store::{CollectionStore, DocumentStore, StoreError};

/// Lazily opened, memoized handle to one collection.
///
/// Concurrent first calls share a single open; a failed open is not
/// remembered and the next call retries.
pub struct StoreAdapter {
    store: Arc<dyn DocumentStore>,
    collection: String,
    handle: OnceCell<Arc<dyn CollectionStore>>,
}

impl StoreAdapter {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            handle: OnceCell::new(),
        }
    }

    pub async fn open(&self) -> Result<Arc<dyn CollectionStore>, StoreError> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                debug!(collection = %self.collection, "opening collection handle");
                self.store.open_collection(&self.collection).await
            })
            .await?;
        Ok(Arc::clone(handle))
    }
}
