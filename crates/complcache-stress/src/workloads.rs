use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use complcache::{CacheConfig, CompletionCache};
use serde::Deserialize;

/// The cache under test, shared by all workloads.
///
/// Keys are namespaced by the index of the workload.
pub type StressCache = CompletionCache<(usize, u64), u64, String>;

#[derive(Debug, Deserialize)]
pub struct WorkloadsConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Deserialize)]
pub struct Workload {
    pub concurrency: usize,
    /// The number of distinct keys requested, in a round robin fashion.
    pub keys: u64,
    /// How long each producer takes.
    #[serde(with = "humantime_serde")]
    pub producer_delay: Duration,
    /// Makes the producers of every n-th key fail.
    #[serde(default)]
    pub fail_every: Option<u64>,
}

#[derive(Debug)]
pub struct Payload {
    index: usize,
    keys: u64,
    producer_delay: Duration,
    fail_every: Option<u64>,

    next_key: AtomicU64,
    /// How often a producer was actually invoked.
    pub productions: Arc<AtomicUsize>,
    /// How many requests ended in an error, including cached ones.
    pub errors: AtomicUsize,
}

pub fn prepare_payload(index: usize, workload: &Workload) -> Payload {
    Payload {
        index,
        keys: workload.keys.max(1),
        producer_delay: workload.producer_delay,
        fail_every: workload.fail_every.filter(|n| *n > 0),

        next_key: AtomicU64::new(0),
        productions: Default::default(),
        errors: AtomicUsize::new(0),
    }
}

pub async fn process_payload(cache: &StressCache, payload: &Payload) {
    let index = payload.index;
    let key = payload.next_key.fetch_add(1, Ordering::Relaxed) % payload.keys;
    let fails = payload.fail_every.is_some_and(|n| key % n == 0);
    let delay = payload.producer_delay;
    let productions = Arc::clone(&payload.productions);

    let producer = move || async move {
        productions.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(delay).await;
        if fails {
            Err(format!("workload {index} refuses to produce key {key}"))
        } else {
            Ok(key)
        }
    };

    if let Err(err) = cache.get_or_create((index, key), producer).await {
        tracing::debug!(workload = index, key, error = %err, "Request failed");
        payload.errors.fetch_add(1, Ordering::Relaxed);
    }
}
