//! Configuration for the loader.
//!
//! # Example
//!
//! ```
//! use apps_loader::LoaderConfig;
//!
//! // Minimal config (uses defaults)
//! let config = LoaderConfig::default();
//! assert_eq!(config.loaders_per_shard, 3);
//! assert_eq!(config.shards.len(), 4);
//!
//! // Override a few knobs
//! let config = LoaderConfig {
//!     pattern: "/data/appsinstalled/*.tsv.gz".into(),
//!     retries: 3,
//!     retry_delay_ms: 50,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LoadError;
use crate::resilience::retry::RetryConfig;

/// Configuration for a loader run.
///
/// All fields have sensible defaults matching a local four-shard setup.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
    /// Glob pattern selecting input files
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Number of parse/encode workers (default: available parallelism)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Number of cache writers per shard
    #[serde(default = "default_loaders_per_shard")]
    pub loaders_per_shard: usize,

    /// Device type → cache address
    #[serde(default = "default_shards")]
    pub shards: BTreeMap<String, String>,

    /// Per-write timeout in seconds (0 = no timeout)
    #[serde(default)]
    pub timeout_secs: u64,

    /// Total write attempts per record
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Flat delay between write attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Capacity of the input queue and of each shard queue
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Acceptable errors/processed ratio for a file
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,

    /// Keep input files in place after loading
    #[serde(default)]
    pub test_mode: bool,

    /// Write into in-memory stores instead of the configured addresses
    #[serde(default)]
    pub dry_run: bool,
}

fn default_pattern() -> String { "/data/appsinstalled/*.tsv.gz".to_string() }
fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
fn default_loaders_per_shard() -> usize { 3 }
fn default_retries() -> usize { 5 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_queue_size() -> usize { 1024 }
fn default_error_threshold() -> f64 { 0.01 }

/// The four device types expected in production logs.
pub fn default_shards() -> BTreeMap<String, String> {
    [
        ("idfa", "127.0.0.1:33013"),
        ("gaid", "127.0.0.1:33014"),
        ("adid", "127.0.0.1:33015"),
        ("dvid", "127.0.0.1:33016"),
    ]
    .into_iter()
    .map(|(t, a)| (t.to_string(), a.to_string()))
    .collect()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            workers: default_workers(),
            loaders_per_shard: default_loaders_per_shard(),
            shards: default_shards(),
            timeout_secs: 0,
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            queue_size: default_queue_size(),
            error_threshold: default_error_threshold(),
            test_mode: false,
            dry_run: false,
        }
    }
}

impl LoaderConfig {
    /// Reject settings that would stall or trivially break a run.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.workers == 0 {
            return Err(LoadError::Config("workers must be at least 1".into()));
        }
        if self.loaders_per_shard == 0 {
            return Err(LoadError::Config("loaders_per_shard must be at least 1".into()));
        }
        if self.queue_size == 0 {
            return Err(LoadError::Config("queue_size must be at least 1".into()));
        }
        if self.shards.is_empty() {
            return Err(LoadError::Config("at least one shard is required".into()));
        }
        if let Some((dev_type, _)) = self.shards.iter().find(|(_, addr)| addr.is_empty()) {
            return Err(LoadError::Config(format!("shard '{}' has no address", dev_type)));
        }
        if !(self.error_threshold > 0.0 && self.error_threshold <= 1.0) {
            return Err(LoadError::Config(format!(
                "error_threshold must be in (0, 1], got {}",
                self.error_threshold
            )));
        }
        Ok(())
    }

    /// Write timeout, `None` when disabled.
    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}
