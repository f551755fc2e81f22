//! Bulk import of a JSON archive mapping collection names to documents.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::application::error::AppError;
use crate::application::registry::CollectionRegistry;
use crate::domain::record::Fields;
use crate::infra::error::InfraError;

pub type Archive = BTreeMap<String, Vec<Fields>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub collections: usize,
    pub documents: usize,
}

pub fn parse_archive(data: &str) -> Result<Archive, AppError> {
    serde_json::from_str(data).map_err(|err| AppError::validation(format!("invalid archive: {err}")))
}

/// Load every collection of the archive with one batch write each.
///
/// Collections are checked against the registry before anything is written.
pub async fn import_archive(
    registry: &CollectionRegistry,
    archive: Archive,
) -> Result<ImportSummary, AppError> {
    let mut services = Vec::with_capacity(archive.len());
    for (name, documents) in archive {
        services.push((registry.collection(&name)?, documents));
    }

    let mut summary = ImportSummary::default();
    for (service, documents) in services {
        let written = service.batch_create(documents).await?;
        info!(
            target = "docdash::import",
            collection = service.name(),
            documents = written.len(),
            "imported collection"
        );
        summary.collections += 1;
        summary.documents += written.len();
    }
    Ok(summary)
}

pub async fn import_file(
    registry: &CollectionRegistry,
    path: &Path,
) -> Result<ImportSummary, AppError> {
    let data = fs::read_to_string(path)
        .map_err(|err| InfraError::import(path.display().to_string(), err.to_string()))?;
    let archive = parse_archive(&data)?;
    import_archive(registry, archive).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::application::pagination::ListParams;
    use crate::cache::CacheConfig;
    use crate::infra::memory::MemoryDocumentStore;

    fn registry() -> CollectionRegistry {
        CollectionRegistry::with_defaults(
            Arc::new(MemoryDocumentStore::new()),
            CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn imports_each_collection() {
        let registry = registry();
        let archive = parse_archive(
            r#"{
                "users": [{"name": "Ada"}, {"name": "Grace"}],
                "incidents": [{"type": "spill", "status": "new"}]
            }"#,
        )
        .expect("valid archive");

        let summary = import_archive(&registry, archive)
            .await
            .expect("import succeeds");
        assert_eq!(
            summary,
            ImportSummary {
                collections: 2,
                documents: 3
            }
        );

        let users = registry.collection("users").expect("users allowed");
        let page = users.list(ListParams::new()).await.expect("list users");
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn unknown_collection_aborts_before_writing() {
        let registry = registry();
        let archive = parse_archive(r#"{"users": [{"name": "Ada"}], "secrets": [{}]}"#)
            .expect("valid archive");

        let err = import_archive(&registry, archive)
            .await
            .expect_err("secrets is not allowed");
        assert!(matches!(err, AppError::Access(_)));

        let users = registry.collection("users").expect("users allowed");
        let stats = users.get_aggregated_stats().await.expect("stats");
        assert_eq!(stats.total, 0);
    }

    #[test]
    fn rejects_non_object_archive() {
        assert!(matches!(
            parse_archive("[1, 2]"),
            Err(AppError::Validation(_))
        ));
    }
}
