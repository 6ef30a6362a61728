use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sentry::{Hub, SentryFutureExt};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::CacheError;
use crate::metric;

/// The outcome of a single production, as it is handed out to every waiter.
pub(crate) type Outcome<V, E> = Result<V, CacheError<E>>;

/// The slot of a single key.
///
/// An entry starts out *pending* and becomes *ready* exactly once, when the producer runner
/// publishes its [`Outcome`]. The `watch` channel is level-triggered, so waiters that show up
/// after the publication see the outcome right away instead of missing the wakeup.
#[derive(Debug)]
pub(crate) struct Entry<V, E> {
    /// When this entry was created. Expiration is measured from here, regardless of when
    /// (or whether) the producer finished.
    requested_on: Instant,
    outcome: watch::Receiver<Option<Outcome<V, E>>>,
}

/// The writing half of an [`Entry`], owned by the producer runner.
#[derive(Debug)]
pub(crate) struct Publisher<V, E> {
    outcome: watch::Sender<Option<Outcome<V, E>>>,
}

impl<V, E> Entry<V, E>
where
    V: Clone,
    E: Clone,
{
    /// Creates a new pending entry along with the [`Publisher`] used to make it ready.
    pub fn pending() -> (Arc<Self>, Publisher<V, E>) {
        let (tx, rx) = watch::channel(None);
        let entry = Entry {
            requested_on: Instant::now(),
            outcome: rx,
        };
        (Arc::new(entry), Publisher { outcome: tx })
    }

    /// Whether this entry is older than `expiration` at time `now`.
    ///
    /// This does not care whether the entry is ready yet. An `expiration` too large to be
    /// represented as an [`Instant`] never expires.
    pub fn is_expired(&self, now: Instant, expiration: Duration) -> bool {
        self.requested_on
            .checked_add(expiration)
            .is_some_and(|deadline| now > deadline)
    }

    /// Whether the outcome has already been published.
    pub fn is_ready(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Waits for the entry to become ready and returns its outcome.
    ///
    /// Returns [`CacheError::Abandoned`] if the publisher went away without publishing.
    pub async fn wait(&self) -> Outcome<V, E> {
        let mut outcome = self.outcome.clone();
        match outcome.wait_for(Option::is_some).await {
            Ok(ready) => match &*ready {
                Some(outcome) => outcome.clone(),
                None => Err(CacheError::Abandoned),
            },
            Err(_) => Err(CacheError::Abandoned),
        }
    }
}

impl<V, E> Publisher<V, E> {
    /// Makes the entry ready, waking up all of its waiters.
    ///
    /// Consumes the publisher, so an entry can only ever be published once.
    fn publish(self, outcome: Outcome<V, E>) {
        // `send_replace` also succeeds when nobody is listening anymore,
        // e.g. when the entry was collected and all callers went away.
        self.outcome.send_replace(Some(outcome));
    }
}

/// Runs `producer` and publishes its outcome into the entry behind `publisher`.
///
/// The producer is spawned as its own task and raced against the `fill` timeout. If the
/// timeout wins, [`CacheError::Timeout`] is published and the producer task is detached: it
/// keeps running until it finishes on its own, and its result is thrown away.
pub(crate) async fn fill<V, E, F, Fut>(
    cache: Arc<str>,
    fill: Duration,
    publisher: Publisher<V, E>,
    producer: F,
) where
    V: Send + 'static,
    E: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    metric!(counter("complcache.computation") += 1, "cache" => &cache);
    let start = Instant::now();

    // Each producer gets its own hub, so scope changes do not leak between concurrent
    // computations.
    let task = async move { producer().await }.bind_hub(Hub::new_from_top(Hub::current()));
    let handle = tokio::spawn(task);

    let outcome = match tokio::time::timeout(fill, handle).await {
        Ok(Ok(result)) => {
            metric!(
                timer("complcache.producer.duration") = start.elapsed(),
                "cache" => &cache,
                "status" => if result.is_ok() { "ok" } else { "error" },
            );
            result.map_err(CacheError::Producer)
        }
        Ok(Err(join_error)) => {
            tracing::warn!(
                cache = %cache,
                error = &join_error as &dyn std::error::Error,
                "Producer did not complete",
            );
            Err(CacheError::Abandoned)
        }
        Err(_elapsed) => {
            metric!(counter("complcache.timeout") += 1, "cache" => &cache);
            tracing::warn!(cache = %cache, ?fill, "Producer timed out, detaching it");
            Err(CacheError::Timeout(fill))
        }
    };

    tracing::debug!(cache = %cache, ok = outcome.is_ok(), "Publishing entry");
    publisher.publish(outcome);
}
