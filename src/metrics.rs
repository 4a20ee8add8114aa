// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for apps-loader.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `apps_loader_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `shard`: device type of the target cache (idfa, gaid, adid, dvid)
//! - `kind`: error category (format, encoding, routing, write)
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a tolerated sub-field error (bad app id or coordinate)
pub fn record_field_error(field: &str) {
    counter!(
        "apps_loader_field_errors_total",
        "field" => field.to_string()
    )
    .increment(1);
}

/// Record a dropped record, categorized for alerting
pub fn record_dropped(kind: &str) {
    counter!(
        "apps_loader_dropped_records_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a finished cache write (after retries)
pub fn record_write(shard: &str, status: &str) {
    counter!(
        "apps_loader_writes_total",
        "shard" => shard.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a retried write attempt
pub fn record_retry(shard: &str) {
    counter!(
        "apps_loader_write_retries_total",
        "shard" => shard.to_string()
    )
    .increment(1);
}

/// Record write latency including retries
pub fn record_write_latency(shard: &str, duration: Duration) {
    histogram!(
        "apps_loader_write_seconds",
        "shard" => shard.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record per-file outcome
pub fn record_file(processed: u64, errors: u64, duration: Duration) {
    counter!("apps_loader_files_total").increment(1);
    counter!("apps_loader_records_processed_total").increment(processed);
    counter!("apps_loader_records_failed_total").increment(errors);
    histogram!("apps_loader_file_seconds").record(duration.as_secs_f64());
}

/// Set error rate of the last evaluated file (0.0 - 1.0)
pub fn set_file_error_rate(rate: f64) {
    gauge!("apps_loader_file_error_rate").set(rate);
}

/// Record a file that could not be read
pub fn record_file_aborted() {
    counter!("apps_loader_files_aborted_total").increment(1);
}

/// Set number of running pipeline tasks by role
pub fn set_active_tasks(role: &str, count: usize) {
    gauge!(
        "apps_loader_active_tasks",
        "role" => role.to_string()
    )
    .set(count as f64);
}
