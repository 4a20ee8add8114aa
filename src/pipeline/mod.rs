// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-file load pipeline.
//!
//! ```text
//!   line source ──(blocking feeder)──► input queue (bounded, shared)
//!                                          │
//!                         ┌────────────────┼────────────────┐
//!                         ▼                ▼                ▼
//!                     worker 0         worker 1   ...   worker W-1
//!                  parse → encode → route by device type
//!                         │                │                │
//!             ┌───────────┴──────┬─────────┴───────┬────────┘
//!             ▼                  ▼                 ▼
//!       idfa queue          gaid queue   ...   dvid queue     (bounded, per shard)
//!        │  │  │             │  │  │            │  │  │
//!       L loaders          L loaders          L loaders       write + flat retry
//! ```
//!
//! Both queue kinds are bounded multi-consumer channels: every item is
//! received by exactly one consumer of the pool.
//!
//! # Lifecycle
//!
//! ```text
//! Idle → Feeding → DrainingWorkers → DrainingLoaders → Finished
//! ```
//!
//! Shutdown is two-phase. The feeder drops the only input sender when the
//! source is exhausted; workers drain the queue and exit. Only after every
//! worker has been joined does the processor drop its shard senders, so no
//! worker can ever send into a closed shard queue. Loaders then drain their
//! queues and exit.

mod loader;
pub mod stats;
mod worker;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::LoadError;
use crate::resilience::retry::RetryConfig;
use crate::routing::ShardRouter;
use crate::storage::traits::CacheStore;

pub use stats::{FileStats, LoaderStats, PipelineReport, Verdict, WorkerStats};

/// Encoded record on its way to a shard.
#[derive(Debug, Clone)]
pub struct OutboundItem {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Pipeline lifecycle, observable through [`FileProcessor::state_receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    /// Pools running, source being fed into the input queue
    Feeding,
    /// Input queue closed, waiting for workers
    DrainingWorkers,
    /// All workers gone and shard queues closed, waiting for loaders
    DrainingLoaders,
    Finished,
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Feeding => write!(f, "Feeding"),
            Self::DrainingWorkers => write!(f, "DrainingWorkers"),
            Self::DrainingLoaders => write!(f, "DrainingLoaders"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

/// Pool sizes and write policy.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub workers: usize,
    pub loaders_per_shard: usize,
    pub queue_size: usize,
    pub retry: RetryConfig,
}

/// Runs one file through the worker and loader pools.
///
/// The router and the stores are fixed for the processor's lifetime; one
/// processor is reused for every file of a run.
pub struct FileProcessor {
    router: Arc<ShardRouter>,
    /// Indexed by shard index
    stores: Vec<Arc<dyn CacheStore>>,
    settings: PipelineSettings,
    state: watch::Sender<ProcessorState>,
}

impl FileProcessor {
    /// `stores[i]` must serve `router.shards()[i]`.
    pub fn new(
        router: Arc<ShardRouter>,
        stores: Vec<Arc<dyn CacheStore>>,
        settings: PipelineSettings,
    ) -> Result<Self, LoadError> {
        if stores.len() != router.len() {
            return Err(LoadError::Config(format!(
                "{} shards configured but {} stores given",
                router.len(),
                stores.len()
            )));
        }
        if settings.workers == 0 || settings.loaders_per_shard == 0 || settings.queue_size == 0 {
            return Err(LoadError::Config(
                "workers, loaders_per_shard and queue_size must be at least 1".into(),
            ));
        }
        let (state, _) = watch::channel(ProcessorState::Idle);
        Ok(Self { router, stores, settings, state })
    }

    #[must_use]
    pub fn state(&self) -> ProcessorState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ProcessorState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// Load every line of `lines`.
    ///
    /// The source is read on the blocking pool and pushed into the bounded
    /// input queue, so a slow pipeline throttles the reader. A source error
    /// stops feeding; lines already queued are still drained and written
    /// before the error is returned.
    #[tracing::instrument(skip_all, fields(workers = self.settings.workers, shards = self.router.len()))]
    pub async fn process_lines<I>(&self, lines: I) -> Result<PipelineReport, LoadError>
    where
        I: IntoIterator<Item = Result<String, LoadError>> + Send + 'static,
        I::IntoIter: Send,
    {
        let settings = &self.settings;

        let (input_tx, input_rx) = async_channel::bounded::<String>(settings.queue_size);

        let mut outbound_tx = Vec::with_capacity(self.router.len());
        let mut outbound_rx = Vec::with_capacity(self.router.len());
        for _ in self.router.shards() {
            let (tx, rx) = async_channel::bounded::<OutboundItem>(settings.queue_size);
            outbound_tx.push(tx);
            outbound_rx.push(rx);
        }

        // Both pools are up before the first line goes in
        let mut loaders = JoinSet::new();
        for (shard, queue) in self.router.shards().iter().zip(&outbound_rx) {
            for loader in 0..settings.loaders_per_shard {
                loaders.spawn(loader::run_loader(
                    shard.clone(),
                    loader,
                    queue.clone(),
                    Arc::clone(&self.stores[shard.index]),
                    settings.retry.clone(),
                ));
            }
        }
        // Loaders hold the only receivers from here on
        drop(outbound_rx);

        let mut workers = JoinSet::new();
        for worker in 0..settings.workers {
            workers.spawn(worker::run_worker(
                worker,
                input_rx.clone(),
                Arc::clone(&self.router),
                outbound_tx.clone(),
            ));
        }
        drop(input_rx);
        crate::metrics::set_active_tasks("worker", workers.len());
        crate::metrics::set_active_tasks("loader", loaders.len());

        self.state.send_replace(ProcessorState::Feeding);
        let feeder = tokio::task::spawn_blocking(move || feed(lines, input_tx));
        let fed = feeder.await;

        // Phase 1: input sender is gone, wait for every worker
        self.state.send_replace(ProcessorState::DrainingWorkers);
        let mut join_error = None;
        let mut worker_stats = Vec::with_capacity(settings.workers);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(stats) => worker_stats.push(stats),
                Err(e) => {
                    error!(error = %e, "Worker task failed");
                    join_error.get_or_insert(e);
                }
            }
        }
        crate::metrics::set_active_tasks("worker", 0);

        // Phase 2: no worker can enqueue anymore, close the shard queues
        let outbound_closed_at = Instant::now();
        drop(outbound_tx);
        self.state.send_replace(ProcessorState::DrainingLoaders);

        let mut loader_stats = Vec::with_capacity(self.router.len() * settings.loaders_per_shard);
        while let Some(joined) = loaders.join_next().await {
            match joined {
                Ok(stats) => loader_stats.push(stats),
                Err(e) => {
                    error!(error = %e, "Loader task failed");
                    join_error.get_or_insert(e);
                }
            }
        }
        crate::metrics::set_active_tasks("loader", 0);
        self.state.send_replace(ProcessorState::Finished);

        let lines_fed = match fed {
            Ok(Ok(n)) => n,
            Ok(Err(source_err)) => return Err(source_err),
            Err(e) => return Err(LoadError::Join(e)),
        };
        if let Some(e) = join_error {
            return Err(LoadError::Join(e));
        }

        worker_stats.sort_by_key(|w| w.worker);
        let report = PipelineReport {
            lines_fed,
            workers: worker_stats,
            loaders: loader_stats,
            outbound_closed_at,
        };
        let totals = report.totals();
        info!(lines = lines_fed, processed = totals.processed, errors = totals.errors, "Pipeline drained");
        Ok(report)
    }
}

/// Push every line into the input queue; runs on the blocking pool.
///
/// Returns the number of lines queued. Dropping `input` on return is the
/// end-of-input signal to the workers.
fn feed<I>(lines: I, input: async_channel::Sender<String>) -> Result<u64, LoadError>
where
    I: IntoIterator<Item = Result<String, LoadError>>,
{
    let mut fed = 0u64;
    for line in lines {
        let line = line?;
        if input.send_blocking(line).is_err() {
            // Every worker is gone; their join errors explain why
            debug!(fed, "Input queue closed early");
            break;
        }
        fed += 1;
    }
    Ok(fed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use std::time::Duration;

    fn processor(workers: usize, loaders: usize) -> (FileProcessor, Vec<Arc<InMemoryStore>>) {
        let router = Arc::new(ShardRouter::from_addresses(crate::config::default_shards()));
        let mem: Vec<Arc<InMemoryStore>> =
            (0..router.len()).map(|_| Arc::new(InMemoryStore::new())).collect();
        let stores = mem.iter().map(|s| Arc::clone(s) as Arc<dyn CacheStore>).collect();
        let settings = PipelineSettings {
            workers,
            loaders_per_shard: loaders,
            queue_size: 4,
            retry: RetryConfig { max_attempts: 2, delay: Duration::from_millis(1) },
        };
        (FileProcessor::new(router, stores, settings).unwrap(), mem)
    }

    fn lines(v: Vec<&str>) -> Vec<Result<String, LoadError>> {
        v.into_iter().map(|s| Ok(s.to_string())).collect()
    }

    #[tokio::test]
    async fn test_routes_to_matching_store() {
        let (processor, stores) = processor(2, 2);
        let report = processor
            .process_lines(lines(vec![
                "idfa\ta\t1\t1\t1",
                "gaid\tb\t1\t1\t1",
                "adid\tc\t1\t1\t1",
                "dvid\td\t1\t1\t1",
                "dvid\te\t1\t1\t1",
            ]))
            .await
            .unwrap();

        assert_eq!(report.totals(), FileStats { errors: 0, processed: 5 });
        let router = processor.router();
        assert_eq!(stores[router.route("idfa").unwrap().index].keys(), vec!["idfa:a"]);
        assert_eq!(stores[router.route("dvid").unwrap().index].len(), 2);
        assert_eq!(processor.state(), ProcessorState::Finished);
    }

    #[tokio::test]
    async fn test_source_error_drains_then_fails() {
        let (processor, stores) = processor(2, 1);
        let source: Vec<Result<String, LoadError>> = vec![
            Ok("idfa\ta\t1\t1\t1".to_string()),
            Err(LoadError::Source {
                path: "broken.gz".into(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt deflate stream"),
            }),
            Ok("idfa\tb\t1\t1\t1".to_string()),
        ];

        let result = processor.process_lines(source).await;
        assert!(matches!(result, Err(LoadError::Source { .. })));
        // line queued before the failure was still written
        let total: usize = stores.iter().map(|s| s.len()).sum();
        assert_eq!(total, 1);
        assert_eq!(processor.state(), ProcessorState::Finished);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let (processor, _) = processor(3, 2);
        let report = processor.process_lines(Vec::new()).await.unwrap();
        assert_eq!(report.lines_fed, 0);
        assert_eq!(report.workers.len(), 3);
        assert_eq!(report.loaders.len(), 8);
        assert_eq!(report.totals().verdict(0.01), Verdict::NotEvaluated);
    }

    #[tokio::test]
    async fn test_processor_is_reusable() {
        let (processor, _) = processor(2, 2);
        for _ in 0..3 {
            let report = processor.process_lines(lines(vec!["gaid\tx\t0\t0\t1"])).await.unwrap();
            assert_eq!(report.totals().processed, 1);
        }
    }

    #[test]
    fn test_store_count_must_match_router() {
        let router = Arc::new(ShardRouter::from_addresses(crate::config::default_shards()));
        let settings = PipelineSettings {
            workers: 1,
            loaders_per_shard: 1,
            queue_size: 1,
            retry: RetryConfig::default(),
        };
        let result = FileProcessor::new(router, vec![Arc::new(InMemoryStore::new())], settings);
        assert!(matches!(result, Err(LoadError::Config(_))));
    }
}
