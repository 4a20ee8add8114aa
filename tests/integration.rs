//! Integration Tests against real Redis shards
//!
//! Tests use testcontainers for portability - no external docker-compose required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: connect, load, read back
//! - `failure_*` - Failure scenarios: unreachable shard, dead shard mid-run

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;

use apps_loader::{
    AppsRecord, CacheStore, FileProcessor, FileStats, LoadError, LoaderConfig, PipelineSettings,
    RedisStore, RetryConfig, RunDriver, ShardRouter, StorageError, UserApps, Verdict,
};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Container Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

fn sample_lines() -> Vec<String> {
    vec![
        "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23".to_string(),
        "gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424".to_string(),
        "adid\t3ebd6d0d5a1c\t-33.86\t151.2\t1,2,3".to_string(),
        "dvid\tf7e2a9\t0\t0\t5".to_string(),
    ]
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_redis_set_and_get() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let addr = format!("127.0.0.1:{}", redis.get_host_port_ipv4(6379));

    let store = RedisStore::connect(&addr, 2, Some(Duration::from_secs(2))).await.unwrap();
    store.set("idfa:abc", &[0x0a, 0x01, 0x07]).await.unwrap();

    assert_eq!(store.get("idfa:abc").await.unwrap(), Some(vec![0x0a, 0x01, 0x07]));
    assert_eq!(store.get("idfa:missing").await.unwrap(), None);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_driver_loads_gzip_into_four_shards() {
    let docker = Cli::default();
    let containers: Vec<_> = (0..4).map(|_| redis_container(&docker)).collect();
    let ports: Vec<u16> = containers.iter().map(|c| c.get_host_port_ipv4(6379)).collect();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("20170929000000.tsv.gz");
    let mut enc = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
    for line in sample_lines() {
        writeln!(enc, "{}", line).unwrap();
    }
    enc.finish().unwrap();

    let mut config = LoaderConfig {
        pattern: format!("{}/*.tsv.gz", dir.path().display()),
        workers: 2,
        loaders_per_shard: 2,
        retry_delay_ms: 10,
        timeout_secs: 2,
        test_mode: true,
        ..Default::default()
    };
    for (dev_type, port) in ["idfa", "gaid", "adid", "dvid"].iter().zip(&ports) {
        config.shards.insert(dev_type.to_string(), format!("127.0.0.1:{}", port));
    }

    let driver = RunDriver::connect(config.clone()).await.unwrap();
    let summary = driver.run().await.unwrap();
    assert_eq!(summary.loaded.len(), 1);
    assert_eq!(summary.loaded[0].stats, FileStats { errors: 0, processed: 4 });
    assert_eq!(summary.loaded[0].verdict, Verdict::Acceptable);
    assert!(path.exists(), "test mode keeps the file");

    // Every value in Redis matches what the codec produces for its line
    for line in sample_lines() {
        let record = AppsRecord::parse(&line).unwrap();
        let store = RedisStore::connect(&config.shards[&record.dev_type], 1, None).await.unwrap();
        let stored = store.get(&record.key()).await.unwrap().expect("key loaded");
        assert_eq!(stored, record.apps.encode().unwrap());
        assert_eq!(UserApps::decode(&stored).unwrap(), record.apps);
    }
}

// =============================================================================
// Failure Scenarios
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_unreachable_shard_fails_startup() {
    let config = LoaderConfig {
        shards: [("idfa".to_string(), "127.0.0.1:1".to_string())].into_iter().collect(),
        ..Default::default()
    };
    let result = RunDriver::connect(config).await;
    assert!(matches!(result, Err(LoadError::Storage(StorageError::Connect { .. }))));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_shard_dies_mid_run_counts_errors() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let addr = format!("127.0.0.1:{}", redis.get_host_port_ipv4(6379));

    let store = Arc::new(RedisStore::connect(&addr, 1, Some(Duration::from_millis(500))).await.unwrap());
    let router = Arc::new(ShardRouter::from_addresses([("idfa", addr.as_str())]));
    let processor = FileProcessor::new(
        router,
        vec![store as Arc<dyn CacheStore>],
        PipelineSettings {
            workers: 1,
            loaders_per_shard: 1,
            queue_size: 4,
            retry: RetryConfig { max_attempts: 2, delay: Duration::from_millis(10) },
        },
    )
    .unwrap();

    drop(redis);

    let lines: Vec<Result<String, LoadError>> =
        (0..5).map(|i| Ok(format!("idfa\td{}\t0\t0\t1", i))).collect();
    let report = processor.process_lines(lines).await.unwrap();
    let stats = report.totals();
    assert_eq!(stats.processed + stats.errors, 5);
    assert_eq!(stats.errors, 5);
}
