//! Lakehouse Server Binary
//!
//! Starts the lake-house: SQLite catalog, object storage, HTTP API,
//! Prometheus exporter and the storage maintenance loop.
//!
//! ## Configuration
//! All configuration is done via environment variables:
//!
//! ### Server Settings
//! - `LAKEHOUSE_ADDR`: API bind address (default: 0.0.0.0:8080)
//! - `LAKEHOUSE_METRICS_ADDR`: metrics bind address (default: 0.0.0.0:9102)
//!
//! ### Storage Settings
//! - `LAKEHOUSE_METADATA`: SQLite catalog path (default: ./data/catalog.db)
//! - `LAKEHOUSE_STORAGE_PATH`: local payload root (default: ./data/storage)
//! - `LAKEHOUSE_USE_S3`: use S3 instead of local disk (any value)
//! - `LAKEHOUSE_BUCKET`: S3 bucket name (default: lakehouse)
//! - `AWS_REGION` / `AWS_ENDPOINT` etc. are read by the S3 builder
//!
//! ### Security
//! - `LAKEHOUSE_ENCRYPTION_KEY`: hex-encoded 32-byte key for PII columns;
//!   schemas requiring encryption fail ingestion without it
//!
//! ### Tuning
//! - `LAKEHOUSE_CACHE_TTL_SECS` (default: 3600)
//! - `LAKEHOUSE_CACHE_CAPACITY` (default: 10000)
//! - `LAKEHOUSE_MAINTENANCE_INTERVAL_SECS` (default: 300)
//! - `LAKEHOUSE_COMPACTION_THRESHOLD_BYTES` (default: 104857600 = 100 MiB)
//! - `LAKEHOUSE_RETENTION_DAYS` (default: 90)
//! - `LAKEHOUSE_QUERY_MAX_PARTITIONS` (default: 10)
//! - `LAKEHOUSE_ORPHAN_GRACE_SECS` (default: 3600)
//!
//! ## Example
//! ```bash
//! # Local development: everything on disk under ./data
//! RUST_LOG=info lakehouse-server
//!
//! # Production-ish: S3 payloads, PII encryption on
//! export LAKEHOUSE_USE_S3=1
//! export LAKEHOUSE_BUCKET=acme-lakehouse
//! export LAKEHOUSE_ENCRYPTION_KEY=$(openssl rand -hex 32)
//! lakehouse-server
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lakehouse_catalog::{CacheConfig, CachedCatalog, SqliteCatalogStore};
use lakehouse_observability::{create_metrics_router, metrics};
use lakehouse_server::maintenance::{MaintenanceConfig, MaintenanceTask};
use lakehouse_server::routes::create_api_router;
use lakehouse_server::warehouse::{LakeWarehouse, WarehouseOptions};
use lakehouse_server::Config;
use lakehouse_storage::PartitionStore;
use lakehouse_stream::{InMemoryBus, StreamGateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    metrics::init();

    let config = Config::from_env();
    info!(api = %config.api_addr, metrics = %config.metrics_addr, "Starting lakehouse server");

    // Durable catalog + TTL cache
    if let Some(parent) = std::path::Path::new(&config.metadata_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteCatalogStore::new(&config.metadata_path).await?;
    let catalog = Arc::new(CachedCatalog::new(
        Arc::new(store),
        CacheConfig {
            partition_capacity: config.cache_capacity,
            schema_capacity: 1_000,
            ttl: config.cache_ttl,
        },
    ));

    // Payload storage (local disk or S3, per configuration)
    let storage = Arc::new(PartitionStore::new(config.build_object_store()?));

    // Streaming gateway over the in-process bus
    let gateway = StreamGateway::new(InMemoryBus::new());

    let encryption = config.build_encryption()?;
    if encryption.is_some() {
        info!("PII encryption enabled");
    }

    let warehouse = Arc::new(LakeWarehouse::new(
        catalog,
        storage,
        gateway,
        encryption,
        WarehouseOptions {
            query_max_partitions: config.query_max_partitions,
            compaction_threshold_bytes: config.compaction_threshold_bytes,
            default_retention: Duration::from_secs(config.retention_days * 24 * 3600),
            orphan_grace: Duration::from_secs(config.orphan_grace_secs),
        },
    ));

    // Background maintenance (compaction, archival, retention, orphans)
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let maintenance = MaintenanceTask::new(
        warehouse.clone(),
        MaintenanceConfig {
            run_interval: config.maintenance_interval,
        },
    )
    .start(shutdown_rx);

    // Metrics exporter on its own listener
    let metrics_listener = tokio::net::TcpListener::bind(&config.metrics_addr).await?;
    info!(addr = %config.metrics_addr, "Metrics exporter listening");
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, create_metrics_router()).await {
            tracing::error!(error = %e, "Metrics server failed");
        }
    });

    // API server (foreground until ctrl-c)
    let api_listener = tokio::net::TcpListener::bind(&config.api_addr).await?;
    info!(addr = %config.api_addr, "API server listening");
    let app = create_api_router(warehouse);

    axum::serve(api_listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Stop background work and wait for the in-flight cycle
    let _ = shutdown_tx.send(());
    let _ = maintenance.await;
    metrics_server.abort();

    info!("Lakehouse server stopped");
    Ok(())
}
