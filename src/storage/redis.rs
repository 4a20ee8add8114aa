// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis backend for one cache shard.
//!
//! Payloads are stored as plain Redis STRINGs (`SET key value`). The store
//! keeps a small pool of multiplexed connections, one per loader, and hands
//! them out round-robin so loaders of the same shard do not queue behind a
//! single socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

use super::traits::{CacheStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

pub struct RedisStore {
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
    /// Bound on a single SET, `None` for no limit
    timeout: Option<Duration>,
}

impl RedisStore {
    /// Connect to `addr` with `pool_size` connections.
    ///
    /// `addr` may be a full `redis://` URL or a bare `host:port`.
    pub async fn connect(
        addr: &str,
        pool_size: usize,
        timeout: Option<Duration>,
    ) -> Result<Self, StorageError> {
        let url = Self::normalize_url(addr);
        let client = Client::open(url.as_str()).map_err(|e| StorageError::Connect {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        let mut connections = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            // Startup config: fail fast on a wrong address
            let connection = retry("redis_connect", &RetryConfig::startup(), || async {
                ConnectionManager::new(client.clone()).await
            })
            .await
            .map_err(|e: redis::RedisError| StorageError::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
            connections.push(connection);
        }
        debug!(addr, pool = connections.len(), "Redis shard connected");

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            timeout,
        })
    }

    /// Prefix bare `host:port` addresses with the redis scheme.
    fn normalize_url(addr: &str) -> String {
        if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{}", addr)
        }
    }

    fn connection(&self) -> ConnectionManager {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx].clone()
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, StorageError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| StorageError::Timeout(limit))?,
            None => fut.await,
        };
        result.map_err(|e| StorageError::Backend(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut conn = self.connection();
        self.with_timeout(async move { conn.set::<_, _, ()>(key, value).await })
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut conn = self.connection();
        self.with_timeout(async move { conn.get::<_, Option<Vec<u8>>>(key).await })
            .await
    }
}
