//! Time-bounded key/value storage for one collection's reads.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use tokio::time::Instant;
use tracing::trace;

use super::keys::{CacheKey, KeyPrefix};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub const METRIC_CACHE_HIT: &str = "docdash_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "docdash_cache_miss_total";
pub const METRIC_CACHE_INVALIDATED: &str = "docdash_cache_invalidated_total";
pub const METRIC_CACHE_SWEPT: &str = "docdash_cache_swept_total";

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Read cache with a fixed entry lifetime and an invalidation generation.
///
/// Entries are only returned while `now < inserted_at + ttl`. Every
/// invalidation bumps the generation while holding the write lock, so a
/// population guarded by [`TtlCache::set_if_generation`] is dropped if any
/// invalidation ran after its generation was captured.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    generation: AtomicU64,
    label: String,
}

impl<V: Clone> TtlCache<V> {
    /// `label` tags emitted metrics, normally the collection name.
    pub fn new(label: impl Into<String>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            generation: AtomicU64::new(0),
            label: label.into(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let rendered = key.render();
        let now = Instant::now();
        let value = {
            let entries = rw_read(&self.entries, SOURCE, "get");
            entries
                .get(&rendered)
                .filter(|entry| self.is_live(entry, now))
                .map(|entry| entry.value.clone())
        };

        let metric = if value.is_some() {
            METRIC_CACHE_HIT
        } else {
            METRIC_CACHE_MISS
        };
        counter!(metric, "collection" => self.label.clone()).increment(1);
        trace!(key = %rendered, hit = value.is_some(), "cache lookup");
        value
    }

    pub fn set(&self, key: &CacheKey, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        rw_write(&self.entries, SOURCE, "set").insert(key.render(), entry);
    }

    /// Current invalidation generation; capture before reading the store.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Insert only if no invalidation happened since `generation` was read.
    pub fn set_if_generation(&self, key: &CacheKey, value: V, generation: u64) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "set_if_generation");
        if self.generation.load(Ordering::Acquire) != generation {
            trace!(key = %key, "skipping cache population after invalidation");
            return false;
        }
        entries.insert(
            key.render(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        let rendered = key.render();
        let removed = {
            let mut entries = rw_write(&self.entries, SOURCE, "delete");
            self.generation.fetch_add(1, Ordering::AcqRel);
            entries.remove(&rendered).is_some()
        };
        if removed {
            self.record_invalidated(1);
        }
        removed
    }

    /// Remove every entry whose rendered key starts with `prefix`.
    pub fn delete_by_prefix(&self, prefix: &KeyPrefix) -> usize {
        let prefix = prefix.render();
        let removed = {
            let mut entries = rw_write(&self.entries, SOURCE, "delete_by_prefix");
            self.generation.fetch_add(1, Ordering::AcqRel);
            let before = entries.len();
            entries.retain(|key, _| !key.starts_with(&prefix));
            before - entries.len()
        };
        self.record_invalidated(removed);
        removed
    }

    pub fn clear(&self) -> usize {
        let removed = {
            let mut entries = rw_write(&self.entries, SOURCE, "clear");
            self.generation.fetch_add(1, Ordering::AcqRel);
            let removed = entries.len();
            entries.clear();
            removed
        };
        self.record_invalidated(removed);
        removed
    }

    /// Evict every expired entry.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut entries = rw_write(&self.entries, SOURCE, "sweep");
            let before = entries.len();
            entries.retain(|_, entry| self.is_live(entry, now));
            before - entries.len()
        };
        if removed > 0 {
            counter!(METRIC_CACHE_SWEPT, "collection" => self.label.clone())
                .increment(removed as u64);
        }
        removed
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_live(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now < entry.inserted_at + self.ttl
    }

    fn record_invalidated(&self, removed: usize) {
        if removed > 0 {
            counter!(METRIC_CACHE_INVALIDATED, "collection" => self.label.clone())
                .increment(removed as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TtlCache<String> {
        TtlCache::new("incidents", Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = cache();
        let key = CacheKey::get_by_id("incidents", "a");
        cache.set(&key, "first".to_string());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&key).as_deref(), Some("first"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_expired_entries() {
        let cache = cache();
        let old = CacheKey::get_by_id("incidents", "old");
        let fresh = CacheKey::get_by_id("incidents", "fresh");
        cache.set(&old, "old".to_string());
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.set(&fresh, "fresh".to_string());
        tokio::time::advance(Duration::from_secs(150)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&fresh).as_deref(), Some("fresh"));
    }

    #[test]
    fn delete_by_prefix_spares_other_families() {
        let cache = cache();
        let stats = CacheKey::stats("incidents");
        let item = CacheKey::get_by_id("incidents", "a");
        let other_stats = CacheKey::stats("incidents_archive");
        for key in [&stats, &item, &other_stats] {
            cache.set(key, "value".to_string());
        }

        assert_eq!(cache.delete_by_prefix(&KeyPrefix::stats("incidents")), 1);
        assert!(cache.get(&stats).is_none());
        assert!(cache.get(&item).is_some());
        assert!(cache.get(&other_stats).is_some());
    }

    #[test]
    fn invalidation_fences_out_stale_population() {
        let cache = cache();
        let key = CacheKey::stats("incidents");
        let generation = cache.generation();

        cache.delete_by_prefix(&KeyPrefix::stats("incidents"));
        assert!(!cache.set_if_generation(&key, "stale".to_string(), generation));
        assert!(cache.get(&key).is_none());

        let generation = cache.generation();
        assert!(cache.set_if_generation(&key, "fresh".to_string(), generation));
        assert_eq!(cache.get(&key).as_deref(), Some("fresh"));
    }

    #[test]
    fn clear_removes_everything() {
        let cache = cache();
        cache.set(&CacheKey::stats("incidents"), "a".to_string());
        cache.set(&CacheKey::get_by_id("incidents", "x"), "b".to_string());
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }
}
