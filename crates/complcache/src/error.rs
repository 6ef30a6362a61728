use std::time::Duration;

use thiserror::Error;

/// An error that happens when constructing a [`CompletionCache`](crate::CompletionCache).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// One of the configured durations is zero.
    ///
    /// Only the first offending parameter is reported.
    #[error("invalid argument {name}={value:?}")]
    InvalidArgument {
        /// The name of the offending parameter.
        name: &'static str,
        /// The rejected value.
        value: Duration,
    },
    /// The cache was constructed outside of a tokio runtime, so there is nothing to
    /// run the collector and the producers on.
    #[error("no tokio runtime available to spawn the collector")]
    NoRuntime,
}

/// An error returned from the operations on a [`CompletionCache`](crate::CompletionCache).
///
/// Apart from [`Producer`](Self::Producer), which forwards whatever the producer returned,
/// all variants are raised by the cache itself. Entry outcomes (including producer errors,
/// [`Timeout`](Self::Timeout) and [`Abandoned`](Self::Abandoned)) are cached and replayed
/// verbatim to every caller of the same key until the entry expires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError<E> {
    /// The cache was closed before the operation started.
    #[error("cache closed")]
    Closed,
    /// [`close`](crate::CompletionCache::close) was called more than once.
    #[error("already closed")]
    AlreadyClosed,
    /// A read-only lookup found no live entry for the key.
    #[error("no such key")]
    NoSuchKey,
    /// The producer did not yield a value within the fill duration.
    ///
    /// The producer itself keeps running in the background.
    #[error("producer timed out after {0:?}")]
    Timeout(Duration),
    /// The producer panicked, or was torn down before it could publish a result.
    #[error("producer abandoned without a result")]
    Abandoned,
    /// The producer failed with its own error.
    #[error("producer failed: {0}")]
    Producer(E),
}

impl<E> CacheError<E> {
    /// Returns the producer error, if this is one.
    pub fn into_producer_error(self) -> Option<E> {
        match self {
            Self::Producer(err) => Some(err),
            _ => None,
        }
    }

    /// A short name for this kind of error, used to tag logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::AlreadyClosed => "already_closed",
            Self::NoSuchKey => "no_such_key",
            Self::Timeout(_) => "timeout",
            Self::Abandoned => "abandoned",
            Self::Producer(_) => "producer",
        }
    }
}
