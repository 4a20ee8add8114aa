// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-task tallies and the per-file verdict.
//!
//! Workers and loaders own their counters privately and hand them back
//! through their join handle when they exit. Nothing is summed until every
//! task of the pool has returned.

use std::time::Instant;

/// Final tally of one worker.
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub worker: usize,
    /// Lines taken from the input queue
    pub lines: u64,
    /// Records handed to a shard queue
    pub enqueued: u64,
    pub format_errors: u64,
    pub encoding_errors: u64,
    pub routing_errors: u64,
    /// Records whose shard queue had no loaders left
    pub queue_errors: u64,
    pub finished_at: Instant,
}

impl WorkerStats {
    pub(crate) fn new(worker: usize) -> Self {
        Self {
            worker,
            lines: 0,
            enqueued: 0,
            format_errors: 0,
            encoding_errors: 0,
            routing_errors: 0,
            queue_errors: 0,
            finished_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn errors(&self) -> u64 {
        self.format_errors + self.encoding_errors + self.routing_errors + self.queue_errors
    }
}

/// Final tally of one loader.
#[derive(Debug, Clone)]
pub struct LoaderStats {
    pub shard: String,
    pub loader: usize,
    pub processed: u64,
    /// Items that failed every attempt
    pub errors: u64,
    /// Extra attempts beyond the first, across all items
    pub retries: u64,
    pub finished_at: Instant,
}

impl LoaderStats {
    pub(crate) fn new(shard: &str, loader: usize) -> Self {
        Self {
            shard: shard.to_string(),
            loader,
            processed: 0,
            errors: 0,
            retries: 0,
            finished_at: Instant::now(),
        }
    }
}

/// Everything the pipeline reports about one file.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Lines read from the source and queued
    pub lines_fed: u64,
    pub workers: Vec<WorkerStats>,
    pub loaders: Vec<LoaderStats>,
    /// When the shard queues were closed
    pub outbound_closed_at: Instant,
}

impl PipelineReport {
    /// `errors = Σworker errors + Σloader errors`, `processed = Σloader processed`.
    #[must_use]
    pub fn totals(&self) -> FileStats {
        let worker_errors: u64 = self.workers.iter().map(WorkerStats::errors).sum();
        let loader_errors: u64 = self.loaders.iter().map(|l| l.errors).sum();
        FileStats {
            errors: worker_errors + loader_errors,
            processed: self.loaders.iter().map(|l| l.processed).sum(),
        }
    }
}

/// File-level outcome.
///
/// # Example
///
/// ```
/// use apps_loader::{FileStats, Verdict};
///
/// let stats = FileStats { errors: 3, processed: 97 };
/// assert!((stats.error_rate().unwrap() - 0.0309).abs() < 1e-4);
/// assert_eq!(stats.verdict(0.01), Verdict::Unacceptable);
///
/// let empty = FileStats { errors: 0, processed: 0 };
/// assert_eq!(empty.verdict(0.01), Verdict::NotEvaluated);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub errors: u64,
    pub processed: u64,
}

impl FileStats {
    /// `errors / processed`, `None` when nothing was written.
    #[must_use]
    pub fn error_rate(&self) -> Option<f64> {
        (self.processed > 0).then(|| self.errors as f64 / self.processed as f64)
    }

    #[must_use]
    pub fn verdict(&self, threshold: f64) -> Verdict {
        match self.error_rate() {
            None => Verdict::NotEvaluated,
            Some(rate) if rate < threshold => Verdict::Acceptable,
            Some(_) => Verdict::Unacceptable,
        }
    }
}

/// Whether a file's error rate is within the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Acceptable,
    Unacceptable,
    /// Nothing was processed, so there is no rate to judge
    NotEvaluated,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acceptable => write!(f, "acceptable"),
            Self::Unacceptable => write!(f, "unacceptable"),
            Self::NotEvaluated => write!(f, "not evaluated"),
        }
    }
}
