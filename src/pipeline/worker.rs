// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Parse/encode/route stage.

use std::sync::Arc;
use std::time::Instant;

use async_channel::{Receiver, Sender};
use tracing::{debug, warn};

use super::stats::WorkerStats;
use super::OutboundItem;
use crate::record::AppsRecord;
use crate::routing::ShardRouter;

/// Consume lines until the input queue is closed and drained.
///
/// `outbound` is indexed by shard index. The worker's clones of those
/// senders are dropped when it returns, which is what lets the shard queues
/// close only after every worker is done.
pub(crate) async fn run_worker(
    worker: usize,
    input: Receiver<String>,
    router: Arc<ShardRouter>,
    outbound: Vec<Sender<OutboundItem>>,
) -> WorkerStats {
    let mut stats = WorkerStats::new(worker);

    // Err means closed and drained
    while let Ok(line) = input.recv().await {
        stats.lines += 1;
        handle_line(&line, &router, &outbound, &mut stats).await;
    }

    stats.finished_at = Instant::now();
    debug!(
        worker,
        lines = stats.lines,
        enqueued = stats.enqueued,
        errors = stats.errors(),
        "Worker drained"
    );
    stats
}

async fn handle_line(
    line: &str,
    router: &ShardRouter,
    outbound: &[Sender<OutboundItem>],
    stats: &mut WorkerStats,
) {
    let record = match AppsRecord::parse(line) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, line, "Dropping malformed line");
            crate::metrics::record_dropped("format");
            stats.format_errors += 1;
            return;
        }
    };

    let payload = match record.apps.encode() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, dev_id = %record.dev_id, "Dropping unencodable record");
            crate::metrics::record_dropped("encoding");
            stats.encoding_errors += 1;
            return;
        }
    };

    let Some(shard) = router.route(&record.dev_type) else {
        warn!(dev_type = %record.dev_type, dev_id = %record.dev_id, "No shard for device type");
        crate::metrics::record_dropped("routing");
        stats.routing_errors += 1;
        return;
    };

    let item = OutboundItem { key: record.key(), payload };
    // Blocks while the shard queue is full
    if outbound[shard.index].send(item).await.is_err() {
        warn!(shard = %shard.name, "Shard queue closed with no loaders, dropping record");
        crate::metrics::record_dropped("queue");
        stats.queue_errors += 1;
        return;
    }
    stats.enqueued += 1;
}
