// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with a flat delay.
//!
//! Every failed attempt waits the same `delay` before the next one; there is
//! no backoff and no jitter, so failure timing stays predictable under load.
//!
//! # Example
//!
//! ```
//! use apps_loader::RetryConfig;
//! use std::time::Duration;
//!
//! // Startup: fail fast on bad addresses
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_attempts, 5);
//!
//! // Loader writes come from configuration
//! let write = RetryConfig { max_attempts: 3, delay: Duration::from_millis(100) };
//! assert_eq!(write.attempts(), 3);
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for operation retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Fast-fail retry for initial connections.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(200),
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    /// Effective attempt count; anything below one still tries once.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

/// Outcome of [`retry_counted`]: the result plus how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: usize,
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_counted(operation_name, config, operation).await.result
}

/// Like [`retry`], but reports the number of attempts made.
pub async fn retry_counted<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max = config.attempts();
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(val) => {
                if attempts > 1 {
                    info!("Operation '{}' succeeded after {} attempts", operation_name, attempts);
                }
                return Attempted { result: Ok(val), attempts };
            }
            Err(err) => {
                if attempts >= max {
                    warn!(
                        "Operation '{}' failed after {} attempts: {}",
                        operation_name, attempts, err
                    );
                    return Attempted { result: Err(err), attempts };
                }

                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name, attempts, max, err, config.delay
                );
                sleep(config.delay).await;
            }
        }
    }
}
