// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache write stage.

use std::sync::Arc;
use std::time::Instant;

use async_channel::Receiver;
use tracing::{debug, error};

use super::stats::LoaderStats;
use super::OutboundItem;
use crate::resilience::retry::{retry_counted, RetryConfig};
use crate::routing::Shard;
use crate::storage::traits::CacheStore;

/// Write items from one shard queue until it is closed and drained.
///
/// Each item ends either processed (some attempt succeeded) or as an error
/// (every attempt failed); only those terminal outcomes touch the counters.
pub(crate) async fn run_loader(
    shard: Shard,
    loader: usize,
    queue: Receiver<OutboundItem>,
    store: Arc<dyn CacheStore>,
    retry: RetryConfig,
) -> LoaderStats {
    let mut stats = LoaderStats::new(&shard.name, loader);

    while let Ok(item) = queue.recv().await {
        let started = Instant::now();
        let outcome = retry_counted("cache_set", &retry, || store.set(&item.key, &item.payload)).await;

        let extra = outcome.attempts.saturating_sub(1) as u64;
        stats.retries += extra;
        for _ in 0..extra {
            crate::metrics::record_retry(&shard.name);
        }
        crate::metrics::record_write_latency(&shard.name, started.elapsed());

        match outcome.result {
            Ok(()) => {
                stats.processed += 1;
                crate::metrics::record_write(&shard.name, "success");
            }
            Err(e) => {
                error!(
                    shard = %shard.name,
                    address = %shard.address,
                    key = %item.key,
                    attempts = outcome.attempts,
                    error = %e,
                    "Cache write failed, giving up on record"
                );
                stats.errors += 1;
                crate::metrics::record_write(&shard.name, "error");
            }
        }
    }

    stats.finished_at = Instant::now();
    debug!(
        shard = %shard.name,
        loader,
        processed = stats.processed,
        errors = stats.errors,
        retries = stats.retries,
        "Loader drained"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::traits::StorageError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Fails the first `failures` writes of every key.
    struct FlakyStore {
        failures: usize,
        seen: StdMutex<HashMap<String, usize>>,
        inner: InMemoryStore,
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            let attempt = {
                let mut seen = self.seen.lock().unwrap();
                let n = seen.entry(key.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            if attempt <= self.failures {
                return Err(StorageError::Backend(format!("flaky attempt {}", attempt)));
            }
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key).await
        }
    }

    fn shard() -> Shard {
        Shard { index: 0, name: "idfa".into(), address: "memory".into() }
    }

    async fn run_with(failures: usize, attempts: usize, items: usize) -> LoaderStats {
        let (tx, rx) = async_channel::bounded(items.max(1));
        for i in 0..items {
            tx.send(OutboundItem { key: format!("idfa:{}", i), payload: vec![1, 2, 3] })
                .await
                .unwrap();
        }
        drop(tx);

        let store = Arc::new(FlakyStore {
            failures,
            seen: StdMutex::new(HashMap::new()),
            inner: InMemoryStore::new(),
        });
        let retry = RetryConfig { max_attempts: attempts, delay: Duration::from_millis(1) };
        run_loader(shard(), 0, rx, store, retry).await
    }

    #[tokio::test]
    async fn test_success_after_retries_counts_processed() {
        let stats = run_with(4, 5, 3).await;
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.retries, 12);
    }

    #[tokio::test]
    async fn test_exhausted_retries_counts_error() {
        let stats = run_with(5, 5, 3).await;
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.errors, 3);
        assert_eq!(stats.retries, 12);
    }

    #[tokio::test]
    async fn test_first_try_success() {
        let stats = run_with(0, 5, 10).await;
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.shard, "idfa");
    }

    /// Every write waits until `parties` writes are in flight at once.
    struct RendezvousStore {
        barrier: tokio::sync::Barrier,
        inner: InMemoryStore,
    }

    #[async_trait]
    impl CacheStore for RendezvousStore {
        async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            self.barrier.wait().await;
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key).await
        }
    }

    #[tokio::test]
    async fn test_loaders_share_one_queue_concurrently() {
        let (tx, rx) = async_channel::bounded(4);
        for i in 0..4 {
            tx.send(OutboundItem { key: format!("idfa:{}", i), payload: vec![i] })
                .await
                .unwrap();
        }
        drop(tx);

        let store = Arc::new(RendezvousStore {
            barrier: tokio::sync::Barrier::new(2),
            inner: InMemoryStore::new(),
        });
        let retry = RetryConfig { max_attempts: 1, delay: Duration::from_millis(1) };

        let first = tokio::spawn(run_loader(shard(), 0, rx.clone(), store.clone(), retry.clone()));
        let second = tokio::spawn(run_loader(shard(), 1, rx, store.clone(), retry));

        // a loader parked on the queue or in a write must not hold the other back
        let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
            (first.await.unwrap(), second.await.unwrap())
        })
        .await
        .expect("loaders deadlocked");

        assert_eq!(first.processed + second.processed, 4);
        assert_eq!(first.processed, 2);
        assert_eq!(second.processed, 2);
        assert_eq!(store.inner.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_closed_queue_exits() {
        let stats = run_with(0, 5, 0).await;
        assert_eq!(stats.processed + stats.errors, 0);
    }
}
