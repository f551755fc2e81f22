//! Per-collection read cache.
//!
//! - [`TtlCache`] stores rendered [`CacheKey`]s with a fixed lifetime.
//! - [`spawn_sweeper`] evicts expired entries in the background.
//! - [`CacheConfig`] carries the `cache` settings section.

mod config;
mod keys;
mod lock;
mod store;
mod sweeper;

pub use config::CacheConfig;
pub use keys::{CacheKey, KeyPrefix, ListKey, canonical};
pub use store::{
    METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATED, METRIC_CACHE_MISS, METRIC_CACHE_SWEPT, TtlCache,
};
pub use sweeper::{SweeperHandle, spawn_sweeper};
