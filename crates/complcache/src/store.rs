use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::entry::{self, Entry};
use crate::{CacheConfig, CacheError, ConfigError, collector, metric};

/// The map of entries, along with the lifecycle flag it is guarded together with.
pub(crate) struct State<K, V, E> {
    pub entries: HashMap<K, Arc<Entry<V, E>>>,
    /// Once set, this is never reset, and no more entries are inserted.
    pub closed: bool,
}

/// The state shared between all handles of a cache and its collector.
pub(crate) struct Shared<K, V, E> {
    pub name: Arc<str>,
    pub expiration: Duration,
    pub fill: Duration,
    state: Mutex<State<K, V, E>>,
    /// Stops the collector.
    shutdown: CancellationToken,
    /// The runtime that producers are spawned on.
    runtime: Handle,
}

impl<K, V, E> Shared<K, V, E> {
    /// Locks the store.
    ///
    /// The lock must never be held across an `.await`. A poisoned lock is recovered, as the map
    /// is only ever mutated through single, non-panicking calls.
    pub fn lock(&self) -> MutexGuard<'_, State<K, V, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A completion cache that memoizes the results of expensive operations by key.
///
/// On [`get_or_create`](Self::get_or_create), a value that is not yet cached (or has expired)
/// is produced by the given producer. Concurrent requests for the same key are coalesced: the
/// producer runs exactly once, and all callers observe its result, including its error.
///
/// The cache is tuned by three durations, see [`CacheConfig`]:
///
/// - `expiration`: how long an entry is served, counted from when it was first requested.
/// - `fill`: how long callers wait for a producer before failing with
///   [`CacheError::Timeout`]. The producer itself is *not* cancelled and keeps running in
///   the background, so producers must always terminate on their own.
/// - `gc_interval`: the time between two sweeps of the background collector, which removes
///   expired entries.
///
/// The cache is a cheap handle; clones share the same entries.
pub struct CompletionCache<K, V, E> {
    pub(crate) inner: Arc<Shared<K, V, E>>,
}

impl<K, V, E> Clone for CompletionCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> fmt::Debug for CompletionCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (entries, closed) = self
            .inner
            .state
            .try_lock()
            .map(|state| (state.entries.len(), state.closed))
            .unwrap_or_default();
        f.debug_struct("CompletionCache")
            .field("name", &self.inner.name)
            .field("expiration", &self.inner.expiration)
            .field("fill", &self.inner.fill)
            .field("entries", &entries)
            .field("closed", &closed)
            .finish()
    }
}

impl<K, V, E> CompletionCache<K, V, E>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a new completion cache and starts its collector.
    ///
    /// All of `expiration`, `fill` and `gc_interval` must be non-zero. This has to be called
    /// from within a tokio runtime, which is used to run the collector and all producers.
    pub fn new(
        expiration: Duration,
        fill: Duration,
        gc_interval: Duration,
    ) -> Result<Self, ConfigError> {
        Self::from_config(&CacheConfig::new(expiration, fill, gc_interval))
    }

    /// Creates a new completion cache from the given config and starts its collector.
    pub fn from_config(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let shutdown = CancellationToken::new();
        let inner = Arc::new(Shared {
            name: config.name.as_str().into(),
            expiration: config.expiration,
            fill: config.fill,
            state: Mutex::new(State {
                entries: HashMap::new(),
                closed: false,
            }),
            shutdown: shutdown.clone(),
            runtime: runtime.clone(),
        });

        runtime.spawn(collector::run(
            Arc::downgrade(&inner),
            shutdown,
            config.gc_interval,
        ));

        tracing::debug!(
            cache = %inner.name,
            expiration = ?config.expiration,
            fill = ?config.fill,
            gc_interval = ?config.gc_interval,
            "Created completion cache",
        );

        Ok(Self { inner })
    }

    /// Returns the cached value for `key`.
    ///
    /// If the entry is still being produced, this waits for it. Never starts a producer.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Closed`] if the cache was closed.
    /// - [`CacheError::NoSuchKey`] if there is no entry, or the entry expired.
    /// - Otherwise the cached error of the entry, for example [`CacheError::Timeout`] when the
    ///   producer of the entry timed out.
    pub async fn get(&self, key: &K) -> Result<V, CacheError<E>> {
        let name = &*self.inner.name;
        metric!(counter("complcache.access") += 1, "cache" => name, "op" => "get");

        let entry = {
            let state = self.inner.lock();
            if state.closed {
                return Err(CacheError::Closed);
            }

            match state.entries.get(key) {
                Some(entry) if !entry.is_expired(Instant::now(), self.inner.expiration) => {
                    Arc::clone(entry)
                }
                _ => return Err(CacheError::NoSuchKey),
            }
        };

        metric!(counter("complcache.hit") += 1, "cache" => name, "op" => "get");
        tracing::trace!(cache = name, ready = entry.is_ready(), "Waiting on existing entry");
        entry.wait().await
    }

    /// Returns the cached value for `key`, or produces it with `producer`.
    ///
    /// If there is no live entry for `key`, a new entry is inserted right away, so that
    /// concurrent callers wait on it instead of starting their own producer. The producer is
    /// then run in its own task.
    ///
    /// After the `fill` duration, waiting callers get a [`CacheError::Timeout`]. The
    /// producer is not interrupted however, and its late result is discarded.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Closed`] if the cache was closed. The producer is not called.
    /// - [`CacheError::Timeout`] if the producer did not finish in time.
    /// - [`CacheError::Producer`] with the error of the producer.
    /// - [`CacheError::Abandoned`] if the producer panicked.
    pub async fn get_or_create<F, Fut>(&self, key: K, producer: F) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let name = &*self.inner.name;
        metric!(counter("complcache.access") += 1, "cache" => name, "op" => "get_or_create");

        let (entry, publisher) = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(CacheError::Closed);
            }

            let live = state
                .entries
                .get(&key)
                .filter(|entry| !entry.is_expired(Instant::now(), self.inner.expiration))
                .cloned();
            match live {
                Some(entry) => (entry, None),
                None => {
                    let (entry, publisher) = Entry::pending();
                    state.entries.insert(key, Arc::clone(&entry));
                    (entry, Some(publisher))
                }
            }
        };

        match publisher {
            Some(publisher) => {
                tracing::debug!(cache = name, "Creating new entry");
                self.inner.runtime.spawn(entry::fill(
                    Arc::clone(&self.inner.name),
                    self.inner.fill,
                    publisher,
                    producer,
                ));
            }
            None => {
                metric!(counter("complcache.hit") += 1, "cache" => name, "op" => "get_or_create");
                tracing::trace!(cache = name, ready = entry.is_ready(), "Waiting on existing entry");
            }
        }

        entry.wait().await
    }

    /// Closes the cache and stops its collector.
    ///
    /// All further calls to [`get`](Self::get) and [`get_or_create`](Self::get_or_create)
    /// fail with [`CacheError::Closed`]. Calls that are already waiting on an entry, and
    /// running producers, are not affected and complete normally.
    ///
    /// # Errors
    ///
    /// [`CacheError::AlreadyClosed`] if the cache was closed before.
    pub fn close(&self) -> Result<(), CacheError<E>> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(CacheError::AlreadyClosed);
        }

        state.closed = true;
        self.inner.shutdown.cancel();

        tracing::debug!(cache = %self.inner.name, entries = state.entries.len(), "Closed cache");
        Ok(())
    }
}

impl<K, V, E> CompletionCache<K, V, E> {
    /// The name of this cache, as used in metrics and logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// The number of entries in the store.
    ///
    /// This includes pending entries, and expired entries that were not collected yet.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
