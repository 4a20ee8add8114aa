//! # Apps Loader
//!
//! Bulk loader for device app-install logs into sharded Redis caches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Run Driver                           │
//! │  • Glob discovery, one file at a time                      │
//! │  • Error-rate verdict, dot-rename on success               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      File Processor                         │
//! │  • Gzip lines → bounded input queue                        │
//! │  • Workers: parse → encode → route by device type          │
//! │  • Two-phase drain: workers first, then loaders            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (bounded queue per shard)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Loaders → Redis shards                   │
//! │  • idfa / gaid / adid / dvid endpoints                     │
//! │  • Flat-delay retry, per-write timeout                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use apps_loader::{LoaderConfig, RunDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), apps_loader::LoadError> {
//!     let config = LoaderConfig {
//!         pattern: "/data/appsinstalled/*.tsv.gz".into(),
//!         ..Default::default()
//!     };
//!
//!     let driver = RunDriver::connect(config).await?;
//!     let summary = driver.run().await?;
//!     for file in &summary.loaded {
//!         println!("{}: {:?} ({})", file.path.display(), file.stats, file.verdict);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`record`]: line parsing and the binary payload
//! - [`routing`]: device type → shard table
//! - [`pipeline`]: worker/loader pools and the [`FileProcessor`]
//! - [`storage`]: cache backends (Redis, in-memory)
//! - [`resilience`]: flat-delay retry
//! - [`driver`]: file discovery and completion marks

pub mod config;
pub mod error;
pub mod record;
pub mod routing;
pub mod storage;
pub mod resilience;
pub mod pipeline;
pub mod source;
pub mod driver;
pub mod metrics;

pub use config::LoaderConfig;
pub use error::LoadError;
pub use record::{AppsRecord, CodecError, UserApps};
pub use routing::{Shard, ShardRouter};
pub use storage::traits::{CacheStore, StorageError};
pub use storage::memory::InMemoryStore;
pub use storage::redis::RedisStore;
pub use resilience::retry::RetryConfig;
pub use pipeline::{
    FileProcessor, FileStats, LoaderStats, OutboundItem, PipelineReport, PipelineSettings,
    ProcessorState, Verdict, WorkerStats,
};
pub use source::GzipLines;
pub use driver::{FileReport, RunDriver, RunSummary};
