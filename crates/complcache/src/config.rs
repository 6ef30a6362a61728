use std::time::Duration;

use serde::Deserialize;

use crate::ConfigError;

/// Configuration of a single [`CompletionCache`](crate::CompletionCache).
///
/// All durations are (de)serialized in human readable form, like `"30s"` or `"1m 30s"`.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// The name of the cache, used to tag metrics and logs.
    pub name: String,
    /// How long a value is served after it was first requested.
    ///
    /// The clock starts when the entry is created, not when the producer finishes.
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
    /// How long callers wait for a producer before giving up with a timeout.
    #[serde(with = "humantime_serde")]
    pub fill: Duration,
    /// The time to wait between two sweeps of the collector.
    #[serde(with = "humantime_serde")]
    pub gc_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            expiration: Duration::from_secs(60),
            fill: Duration::from_secs(60),
            gc_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Creates a config with the given durations and the default name.
    pub fn new(expiration: Duration, fill: Duration, gc_interval: Duration) -> Self {
        Self {
            expiration,
            fill,
            gc_interval,
            ..Default::default()
        }
    }

    /// Checks that all durations are strictly positive.
    ///
    /// Parameters are checked in order, and the first zero duration is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("expiration", self.expiration),
            ("fill", self.fill),
            ("gc_interval", self.gc_interval),
        ];

        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidArgument { name, value });
            }
        }

        Ok(())
    }
}
