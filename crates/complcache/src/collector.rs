use std::hash::Hash;
use std::sync::Weak;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::metric;
use crate::store::Shared;

/// Periodically removes expired entries from the cache.
///
/// Runs until either `shutdown` is cancelled by closing the cache, or all handles to the
/// cache have been dropped.
pub(crate) async fn run<K, V, E>(
    cache: Weak<Shared<K, V, E>>,
    shutdown: CancellationToken,
    interval: Duration,
) where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    loop {
        {
            let Some(cache) = cache.upgrade() else {
                break;
            };
            if cache.lock().closed {
                break;
            }
            cache.sweep();
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::trace!("Collector stopped");
}

impl<K, V, E> Shared<K, V, E>
where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    /// Removes all expired entries, returning how many were removed.
    ///
    /// Callers already waiting on a removed entry are unaffected, as they hold on to the
    /// entry itself.
    pub(crate) fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();

        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| !entry.is_expired(now, self.expiration));
        let remaining = state.entries.len();
        drop(state);

        let removed = before - remaining;
        metric!(gauge("complcache.entries") = remaining as u64, "cache" => &self.name);
        if removed > 0 {
            tracing::debug!(cache = %self.name, removed, remaining, "Collected expired entries");
        }
        removed
    }
}
