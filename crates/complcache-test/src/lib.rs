//! Helpers for testing the completion cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Tests that depend on timing should run on a paused clock (`#[tokio::test(start_paused =
//!    true)]`), so that the delays of the producers below do not actually slow down the tests
//!    and are not subject to scheduling jitter.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// The future returned by the producers of a [`CountingProducer`].
pub type BoxedResult<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `complcache` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("complcache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Returns `value` after sleeping for `delay`.
pub async fn return_after<T, E>(value: T, delay: Duration) -> Result<T, E> {
    tokio::time::sleep(delay).await;
    Ok(value)
}

/// Fails with `error` after sleeping for `delay`.
pub async fn fail_after<T, E>(error: E, delay: Duration) -> Result<T, E> {
    tokio::time::sleep(delay).await;
    Err(error)
}

/// Counts how often the producers it hands out were invoked.
#[derive(Clone, Debug, Default)]
pub struct CountingProducer {
    calls: Arc<AtomicUsize>,
}

impl CountingProducer {
    /// Creates a new counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of producers that were invoked so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns a producer that yields `value` after `delay`, counting its invocation.
    pub fn returning<T, E>(
        &self,
        value: T,
        delay: Duration,
    ) -> impl FnOnce() -> BoxedResult<T, E> + Send + use<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(return_after(value, delay))
        }
    }

    /// Returns a producer that fails with `error` after `delay`, counting its invocation.
    pub fn failing<T, E>(
        &self,
        error: E,
        delay: Duration,
    ) -> impl FnOnce() -> BoxedResult<T, E> + Send + use<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(fail_after(error, delay))
        }
    }
}
