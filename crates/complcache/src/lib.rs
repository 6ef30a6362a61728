//! # A completion cache for expensive operations
//!
//! The [`CompletionCache`] memoizes the results of long running or otherwise expensive
//! operations by key. It returns the most recent cached value for a key, or starts the
//! operation from scratch if there is none or the old value has expired.
//!
//! Concurrent requests for the same missing key are coalesced: the operation (the
//! *producer*) runs exactly once, and every caller observes its result.
//!
//! ## Entries
//!
//! Each key maps to an entry, which starts out *pending* and becomes *ready* exactly once.
//! A new entry is inserted into the store as soon as it is requested, so that concurrent
//! callers find it and wait for it instead of starting their own producer. Waiting happens
//! on the entry itself, never while holding the lock on the store, so unrelated keys do not
//! block each other.
//!
//! The outcome of an entry is whatever finished first:
//!
//! - The producer, with either its value or its error. Errors are cached just like values
//!   and replayed to every caller until the entry expires. There is no retry before that.
//! - The `fill` timeout, in which case [`CacheError::Timeout`] is cached. The producer is
//!   *not* cancelled: it keeps running in the background, and its result is discarded.
//!   Producers must therefore always terminate on their own.
//!
//! ## Expiration
//!
//! An entry expires `expiration` after it was *requested*, not after it became ready. A slow
//! producer can thus yield an entry that is expired right away. Expired entries are treated
//! as absent by new lookups, while callers already waiting on them still get their result.
//!
//! A background collector sweeps expired entries out of the store every `gc_interval`, until
//! the cache is [closed](CompletionCache::close) or dropped.
//!
//! ## Metrics
//!
//! Once [`metrics::configure_statsd`] was called, the following metrics are emitted, each
//! tagged with the `cache` name:
//!
//! - `complcache.access`: All accesses, tagged with the `op`.
//! - `complcache.hit`: Accesses served by an existing live entry.
//! - `complcache.computation`: Producers being run.
//! - `complcache.timeout`: Producers that did not finish within `fill`.
//! - `complcache.producer.duration`: The time producers took when they finished in time.
//! - `complcache.entries`: The number of entries left after each collector sweep.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use complcache::CompletionCache;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let minute = Duration::from_secs(60);
//! let cache = CompletionCache::<&str, String, String>::new(minute, minute, minute).unwrap();
//!
//! let value = cache
//!     .get_or_create("example.com", || async {
//!         // fetching this may be slow, so it is worth caching
//!         Ok("<!doctype html>".to_owned())
//!     })
//!     .await;
//! assert_eq!(value.as_deref(), Ok("<!doctype html>"));
//!
//! // subsequent lookups are served from the cache
//! assert_eq!(cache.get(&"example.com").await, value);
//! # }
//! ```

#![warn(missing_docs)]

mod collector;
mod config;
mod entry;
mod error;
#[allow(missing_docs)]
pub mod metrics;
mod store;

pub use config::*;
pub use error::*;
pub use store::CompletionCache;
