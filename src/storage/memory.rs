use async_trait::async_trait;
use dashmap::DashMap;
use super::traits::{CacheStore, StorageError};

pub struct InMemoryStore {
    data: DashMap<String, Vec<u8>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current item count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of all stored keys
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.iter().map(|r| r.key().clone()).collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }
}
