// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `apps-loader` command line.
//!
//! ```bash
//! apps-loader --pattern '/data/appsinstalled/*.tsv.gz' --workers 8 --loaders 3 \
//!     --idfa 127.0.0.1:33013 --gaid 127.0.0.1:33014 --adid 127.0.0.1:33015 --dvid 127.0.0.1:33016
//! ```

use std::collections::BTreeMap;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use apps_loader::{LoaderConfig, RunDriver};

#[derive(Debug, Parser)]
#[command(name = "apps-loader", version, about = "Load app-install logs into sharded Redis caches")]
struct Cli {
    /// Glob pattern of gzip log files
    #[arg(long)]
    pattern: Option<String>,

    /// Parse/encode workers (default: available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Cache writers per shard
    #[arg(long = "loaders")]
    loaders_per_shard: Option<usize>,

    #[arg(long)]
    idfa: Option<String>,
    #[arg(long)]
    gaid: Option<String>,
    #[arg(long)]
    adid: Option<String>,
    #[arg(long)]
    dvid: Option<String>,

    /// Per-write timeout in seconds, 0 disables
    #[arg(long = "timeout")]
    timeout_secs: Option<u64>,

    /// Write attempts per record
    #[arg(long)]
    retries: Option<usize>,

    /// Pause between write attempts
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    #[arg(long)]
    queue_size: Option<usize>,

    /// Acceptable errors/processed ratio per file
    #[arg(long)]
    error_threshold: Option<f64>,

    /// Do not rename loaded files
    #[arg(long = "test")]
    test_mode: bool,

    /// Write to in-memory stores instead of Redis
    #[arg(long)]
    dry_run: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> LoaderConfig {
        let defaults = LoaderConfig::default();

        let mut shards: BTreeMap<String, String> = defaults.shards.clone();
        for (dev_type, addr) in [
            ("idfa", self.idfa),
            ("gaid", self.gaid),
            ("adid", self.adid),
            ("dvid", self.dvid),
        ] {
            if let Some(addr) = addr {
                shards.insert(dev_type.to_string(), addr);
            }
        }

        LoaderConfig {
            pattern: self.pattern.unwrap_or(defaults.pattern),
            workers: self.workers.unwrap_or(defaults.workers),
            loaders_per_shard: self.loaders_per_shard.unwrap_or(defaults.loaders_per_shard),
            shards,
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            retries: self.retries.unwrap_or(defaults.retries),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            queue_size: self.queue_size.unwrap_or(defaults.queue_size),
            error_threshold: self.error_threshold.unwrap_or(defaults.error_threshold),
            test_mode: self.test_mode,
            dry_run: self.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = cli.into_config();
    info!(
        pattern = %config.pattern,
        workers = config.workers,
        loaders_per_shard = config.loaders_per_shard,
        test_mode = config.test_mode,
        dry_run = config.dry_run,
        "Starting apps-loader"
    );

    let driver = match RunDriver::connect(config).await {
        Ok(driver) => driver,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match driver.run().await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Run failed");
            ExitCode::FAILURE
        }
    }
}
