use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serde_json::json;
use serial_test::serial;

use docdash::application::collection::CollectionService;
use docdash::application::pagination::ListParams;
use docdash::cache::{
    CacheConfig, CacheKey, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATED, METRIC_CACHE_MISS,
    METRIC_CACHE_SWEPT, TtlCache,
};
use docdash::infra::memory::MemoryDocumentStore;

#[tokio::test(start_paused = true)]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = Arc::new(MemoryDocumentStore::new());
    let users = CollectionService::new(store, "users", &CacheConfig::default());

    // miss, then hit
    users.list(ListParams::new()).await.expect("list");
    users.list(ListParams::new()).await.expect("list");

    // invalidates the cached page
    let mut data = serde_json::Map::new();
    data.insert("name".to_string(), json!("Ada"));
    users.create(data).await.expect("create");

    let sessions = TtlCache::new("sessions", Duration::from_secs(1));
    sessions.set(&CacheKey::stats("sessions"), 1_u32);
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(sessions.sweep(), 1);

    let counters: HashMap<(String, String), u64> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| {
            let key = composite_key.key();
            let collection = key
                .labels()
                .find(|label| label.key() == "collection")
                .map(|label| label.value().to_string())?;
            match value {
                DebugValue::Counter(count) => Some(((key.name().to_string(), collection), count)),
                _ => None,
            }
        })
        .collect();

    let expected = [
        (METRIC_CACHE_MISS, "users", 1),
        (METRIC_CACHE_HIT, "users", 1),
        (METRIC_CACHE_INVALIDATED, "users", 1),
        (METRIC_CACHE_SWEPT, "sessions", 1),
    ];
    for (metric, collection, count) in expected {
        assert_eq!(
            counters.get(&(metric.to_string(), collection.to_string())),
            Some(&count),
            "unexpected value for {metric}{{collection={collection}}}"
        );
    }
}
