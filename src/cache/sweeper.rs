//! Background eviction of expired cache entries.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use super::store::TtlCache;

/// Owns the sweep task; dropping the handle stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sweep `cache` every `period` until it is dropped.
///
/// The task only holds a weak reference. Outside a tokio runtime no task is
/// started and expired entries are left to lazy expiry.
pub fn spawn_sweeper<V>(cache: &Arc<TtlCache<V>>, period: Duration) -> Option<SweeperHandle>
where
    V: Clone + Send + Sync + 'static,
{
    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!(error = %err, "no tokio runtime; cache sweep disabled");
            return None;
        }
    };

    let cache: Weak<TtlCache<V>> = Arc::downgrade(cache);
    let task = runtime.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(cache) = cache.upgrade() else {
                break;
            };
            let swept = cache.sweep();
            if swept > 0 {
                debug!(swept, "swept expired cache entries");
            }
        }
    });

    Some(SweeperHandle { task })
}
