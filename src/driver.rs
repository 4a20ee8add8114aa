// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run driver: file discovery, sequential per-file loading, completion marks.
//!
//! Files are processed one at a time; each file gets the full worker and
//! loader parallelism. A file that loads with an acceptable error rate is
//! renamed with a leading dot so the next run skips it (unless test mode
//! is on).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::pipeline::{FileProcessor, FileStats, PipelineSettings, Verdict};
use crate::routing::ShardRouter;
use crate::source::GzipLines;
use crate::storage::memory::InMemoryStore;
use crate::storage::redis::RedisStore;
use crate::storage::traits::CacheStore;

/// Marker prefix for loaded files.
pub const LOADED_PREFIX: char = '.';

/// Outcome of one successfully read file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub stats: FileStats,
    pub verdict: Verdict,
    /// New name if the file was marked as loaded
    pub renamed_to: Option<PathBuf>,
    pub duration: Duration,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub loaded: Vec<FileReport>,
    /// Files that could not be read, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl RunSummary {
    /// True when every file was read and none had an unacceptable rate.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.loaded.iter().all(|r| r.verdict != Verdict::Unacceptable)
    }
}

pub struct RunDriver {
    config: LoaderConfig,
    processor: FileProcessor,
}

impl RunDriver {
    /// Validate config and connect every shard (in-memory on dry runs).
    pub async fn connect(config: LoaderConfig) -> Result<Self, LoadError> {
        config.validate()?;
        let router = ShardRouter::from_addresses(config.shards.clone());

        let mut stores: Vec<Arc<dyn CacheStore>> = Vec::with_capacity(router.len());
        for shard in router.shards() {
            if config.dry_run {
                stores.push(Arc::new(InMemoryStore::new()));
                continue;
            }
            info!(shard = %shard.name, address = %shard.address, "Connecting shard");
            let store = RedisStore::connect(
                &shard.address,
                config.loaders_per_shard,
                config.write_timeout(),
            )
            .await?;
            stores.push(Arc::new(store));
        }

        Self::with_stores(config, router, stores)
    }

    /// Build a driver over already-connected stores, indexed like `router`.
    pub fn with_stores(
        config: LoaderConfig,
        router: ShardRouter,
        stores: Vec<Arc<dyn CacheStore>>,
    ) -> Result<Self, LoadError> {
        config.validate()?;
        let settings = PipelineSettings {
            workers: config.workers,
            loaders_per_shard: config.loaders_per_shard,
            queue_size: config.queue_size,
            retry: config.retry_config(),
        };
        let processor = FileProcessor::new(Arc::new(router), stores, settings)?;
        Ok(Self { config, processor })
    }

    #[must_use]
    pub fn processor(&self) -> &FileProcessor {
        &self.processor
    }

    /// Input files matching the pattern, sorted, excluding loaded ones.
    pub fn discover(&self) -> Result<Vec<PathBuf>, LoadError> {
        let mut files = Vec::new();
        for entry in glob::glob(&self.config.pattern)? {
            match entry {
                Ok(path) if is_loaded(&path) => {}
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping unreadable path"),
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load a single file and apply the completion mark.
    #[tracing::instrument(skip(self), fields(file = %path.display()))]
    pub async fn process_file(&self, path: &Path) -> Result<FileReport, LoadError> {
        let started = Instant::now();
        info!("Processing file");

        let lines = GzipLines::open(path)?;
        let report = self.processor.process_lines(lines).await?;
        let stats = report.totals();
        let verdict = stats.verdict(self.config.error_threshold);
        let duration = started.elapsed();

        crate::metrics::record_file(stats.processed, stats.errors, duration);
        match stats.error_rate() {
            Some(rate) => {
                crate::metrics::set_file_error_rate(rate);
                match verdict {
                    Verdict::Acceptable => info!(
                        errors = stats.errors,
                        processed = stats.processed,
                        "Acceptable error rate ({:.4}). Successful load",
                        rate
                    ),
                    _ => error!(
                        errors = stats.errors,
                        processed = stats.processed,
                        threshold = self.config.error_threshold,
                        "High error rate ({:.4} >= {}). Failed load",
                        rate,
                        self.config.error_threshold
                    ),
                }
            }
            None => warn!(errors = stats.errors, "No records processed, error rate not evaluated"),
        }

        let renamed_to = if verdict == Verdict::Acceptable && !self.config.test_mode {
            Some(mark_loaded(path)?)
        } else {
            None
        };

        Ok(FileReport {
            path: path.to_path_buf(),
            stats,
            verdict,
            renamed_to,
            duration,
        })
    }

    /// Process every discovered file in order. Unreadable files are
    /// recorded and skipped.
    pub async fn run(&self) -> Result<RunSummary, LoadError> {
        let files = self.discover()?;
        if files.is_empty() {
            warn!(pattern = %self.config.pattern, "No input files matched");
        }

        let mut summary = RunSummary::default();
        for path in files {
            match self.process_file(&path).await {
                Ok(report) => summary.loaded.push(report),
                Err(e) => {
                    error!(file = %path.display(), error = %e, "File aborted");
                    crate::metrics::record_file_aborted();
                    summary.failed.push((path, e.to_string()));
                }
            }
        }
        info!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            "Run finished"
        );
        Ok(summary)
    }
}

fn is_loaded(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(LOADED_PREFIX))
}

/// Rename `dir/name` to `dir/.name`.
pub fn mark_loaded(path: &Path) -> Result<PathBuf, LoadError> {
    let name = path.file_name().ok_or_else(|| LoadError::Rename {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    let mut marked = std::ffi::OsString::from(LOADED_PREFIX.to_string());
    marked.push(name);
    let target = path.with_file_name(marked);

    std::fs::rename(path, &target).map_err(|source| LoadError::Rename {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_loaded_prefixes_dot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20170929000000.tsv.gz");
        std::fs::write(&path, b"x").unwrap();

        let target = mark_loaded(&path).unwrap();
        assert_eq!(target, dir.path().join(".20170929000000.tsv.gz"));
        assert!(target.exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_mark_loaded_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = mark_loaded(&dir.path().join("gone.gz"));
        assert!(matches!(result, Err(LoadError::Rename { .. })));
    }

    #[test]
    fn test_is_loaded() {
        assert!(is_loaded(Path::new("/data/.a.tsv.gz")));
        assert!(!is_loaded(Path::new("/data/a.tsv.gz")));
        assert!(!is_loaded(Path::new("/data/.hidden/a.tsv.gz")));
    }

    #[test]
    fn test_summary_success() {
        let report = |verdict| FileReport {
            path: "a".into(),
            stats: FileStats::default(),
            verdict,
            renamed_to: None,
            duration: Duration::ZERO,
        };
        let ok = RunSummary { loaded: vec![report(Verdict::Acceptable), report(Verdict::NotEvaluated)], failed: vec![] };
        assert!(ok.is_success());

        let bad = RunSummary { loaded: vec![report(Verdict::Unacceptable)], failed: vec![] };
        assert!(!bad.is_success());

        let aborted = RunSummary { loaded: vec![], failed: vec![("b".into(), "boom".into())] };
        assert!(!aborted.is_success());
    }
}
