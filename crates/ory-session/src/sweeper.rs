//! Background sweep of expired entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use crate::cache::SessionCache;

/// Spawn a task that periodically removes expired entries from `cache`.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. The first sweep happens one full `interval` after spawning.
pub fn spawn_sweeper<V>(cache: SessionCache<V>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = cache.cleanup_expired();
            trace!(removed, remaining = cache.len(), "Session cache sweep");
        }
    })
}
