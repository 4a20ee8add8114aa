use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Write timed out after {0:?}")]
    Timeout(Duration),
    #[error("Cannot connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },
}

/// Key/value cache endpoint for one shard.
///
/// Shared read-only by every loader of the shard; implementations handle
/// their own connection pooling.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}
