//! Server Configuration
//!
//! All configuration comes from environment variables, loaded once at
//! startup. See the binary's module docs for the full list; everything has
//! a development-friendly default so `lakehouse-server` starts with no
//! environment at all (local disk storage, SQLite next to it).

use std::sync::Arc;
use std::time::Duration;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;

use lakehouse_core::EncryptionCodec;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Process-wide configuration, resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite catalog database path
    pub metadata_path: String,
    /// HTTP API bind address
    pub api_addr: String,
    /// Prometheus exporter bind address
    pub metrics_addr: String,
    /// Local storage root (used unless S3 is configured)
    pub storage_path: String,
    /// S3 bucket; set together with `use_s3`
    pub bucket: String,
    /// Use S3 instead of local disk
    pub use_s3: bool,
    /// Hex-encoded 32-byte PII encryption key (optional)
    pub encryption_key: Option<String>,
    /// Catalog cache TTL
    pub cache_ttl: Duration,
    /// Catalog cache capacity (partitions)
    pub cache_capacity: u64,
    /// Maintenance cycle interval
    pub maintenance_interval: Duration,
    /// Compaction threshold in bytes
    pub compaction_threshold_bytes: u64,
    /// Default retention in days
    pub retention_days: u64,
    /// Bounded query fan-in
    pub query_max_partitions: usize,
    /// Orphan sweep grace period in seconds
    pub orphan_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            metadata_path: env_or("LAKEHOUSE_METADATA", "./data/catalog.db"),
            api_addr: env_or("LAKEHOUSE_ADDR", "0.0.0.0:8080"),
            metrics_addr: env_or("LAKEHOUSE_METRICS_ADDR", "0.0.0.0:9102"),
            storage_path: env_or("LAKEHOUSE_STORAGE_PATH", "./data/storage"),
            bucket: env_or("LAKEHOUSE_BUCKET", "lakehouse"),
            use_s3: std::env::var("LAKEHOUSE_USE_S3").is_ok(),
            encryption_key: std::env::var("LAKEHOUSE_ENCRYPTION_KEY").ok(),
            cache_ttl: Duration::from_secs(env_parse("LAKEHOUSE_CACHE_TTL_SECS", 3600)),
            cache_capacity: env_parse("LAKEHOUSE_CACHE_CAPACITY", 10_000),
            maintenance_interval: Duration::from_secs(env_parse(
                "LAKEHOUSE_MAINTENANCE_INTERVAL_SECS",
                300,
            )),
            compaction_threshold_bytes: env_parse(
                "LAKEHOUSE_COMPACTION_THRESHOLD_BYTES",
                100 * 1024 * 1024,
            ),
            retention_days: env_parse("LAKEHOUSE_RETENTION_DAYS", 90),
            query_max_partitions: env_parse("LAKEHOUSE_QUERY_MAX_PARTITIONS", 10),
            orphan_grace_secs: env_parse("LAKEHOUSE_ORPHAN_GRACE_SECS", 3600),
        }
    }

    /// Build the payload store per configuration: S3 when requested,
    /// otherwise the local filesystem (directory created on demand).
    pub fn build_object_store(&self) -> Result<Arc<dyn ObjectStore>, object_store::Error> {
        if self.use_s3 {
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(&self.bucket)
                .build()?;
            tracing::info!(bucket = %self.bucket, "Using S3 object storage");
            Ok(Arc::new(store))
        } else {
            std::fs::create_dir_all(&self.storage_path).map_err(|source| {
                object_store::Error::Generic {
                    store: "LocalFileSystem",
                    source: Box::new(source),
                }
            })?;
            let store = LocalFileSystem::new_with_prefix(&self.storage_path)?;
            tracing::info!(path = %self.storage_path, "Using local filesystem storage");
            Ok(Arc::new(store))
        }
    }

    /// Build the PII encryption codec when a key is configured.
    pub fn build_encryption(&self) -> Result<Option<EncryptionCodec>, lakehouse_core::Error> {
        self.encryption_key
            .as_deref()
            .map(EncryptionCodec::from_hex_key)
            .transpose()
    }
}
