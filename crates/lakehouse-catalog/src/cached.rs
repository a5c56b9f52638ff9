//! Catalog Caching Layer
//!
//! Wraps a [`CatalogStore`] with a TTL cache so hot partition and schema
//! lookups never touch the database.
//!
//! ## What Gets Cached
//!
//! - **Partitions** by ID (read on every query fan-in and checksum
//!   verification) - TTL 1 hour
//! - **Schemas** by name, latest version only (read on every ingestion) -
//!   TTL 1 hour
//!
//! ## What Does NOT Get Cached
//!
//! - `find_partitions` listings - these drive correctness decisions
//!   (pruning, compaction, retention) and must always see the durable
//!   store's view
//! - Lineage and layer stats - maintenance-path reads, not hot
//!
//! ## Cache Invalidation
//!
//! Write-through: `register_partition` updates the cache entry in place;
//! `remove_partition` and `register_schema` invalidate. TTL expiry plus
//! capacity-bounded eviction (moka) keeps memory bounded for long-running
//! processes.
//!
//! ## Degraded Mode
//!
//! The cache is optional. A catalog built with [`CachedCatalog::without_cache`]
//! behaves identically with every read hitting the durable store; `health()`
//! callers report this as degraded rather than unhealthy - the store alone
//! is still authoritative.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use lakehouse_core::{DataPartition, DataSchema, LakeLayer};
use lakehouse_observability::metrics;

use crate::error::Result;
use crate::store::{CatalogStore, LayerStats, LineageRecord};

/// Cache sizing and expiry settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum cached partitions
    pub partition_capacity: u64,
    /// Maximum cached schemas
    pub schema_capacity: u64,
    /// Time-to-live for both caches
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            partition_capacity: 10_000,
            schema_capacity: 1_000,
            ttl: Duration::from_secs(3600), // 1 hour
        }
    }
}

struct Caches {
    partitions: Cache<String, DataPartition>,
    schemas: Cache<String, DataSchema>,
}

/// A [`CatalogStore`] with a transparent TTL cache in front of it.
pub struct CachedCatalog {
    store: Arc<dyn CatalogStore>,
    caches: Option<Caches>,
}

impl CachedCatalog {
    pub fn new(store: Arc<dyn CatalogStore>, config: CacheConfig) -> Self {
        let partitions = Cache::builder()
            .max_capacity(config.partition_capacity)
            .time_to_live(config.ttl)
            .build();
        let schemas = Cache::builder()
            .max_capacity(config.schema_capacity)
            .time_to_live(config.ttl)
            .build();
        Self {
            store,
            caches: Some(Caches { partitions, schemas }),
        }
    }

    /// Cache-less catalog: every read hits the durable store (degraded mode).
    pub fn without_cache(store: Arc<dyn CatalogStore>) -> Self {
        Self { store, caches: None }
    }

    pub fn cache_enabled(&self) -> bool {
        self.caches.is_some()
    }

    // ============================================================
    // SCHEMA OPERATIONS
    // ============================================================

    /// Register a new schema version. Invalidates the cached latest version.
    pub async fn register_schema(&self, schema: &DataSchema) -> Result<u32> {
        let version = self.store.register_schema(schema).await?;
        if let Some(caches) = &self.caches {
            caches.schemas.invalidate(&schema.name).await;
        }
        Ok(version)
    }

    /// Latest version of a schema, cache-first.
    pub async fn get_schema(&self, name: &str) -> Result<Option<DataSchema>> {
        if let Some(caches) = &self.caches {
            if let Some(schema) = caches.schemas.get(name).await {
                metrics::CACHE_HITS_TOTAL.inc();
                return Ok(Some(schema));
            }
            metrics::CACHE_MISSES_TOTAL.inc();
        }

        let schema = self.store.get_schema(name).await?;
        if let (Some(caches), Some(schema)) = (&self.caches, &schema) {
            caches.schemas.insert(name.to_string(), schema.clone()).await;
        }
        Ok(schema)
    }

    pub async fn get_schema_version(&self, name: &str, version: u32) -> Result<Option<DataSchema>> {
        self.store.get_schema_version(name, version).await
    }

    pub async fn list_schemas(&self) -> Result<Vec<DataSchema>> {
        self.store.list_schemas().await
    }

    // ============================================================
    // PARTITION OPERATIONS
    // ============================================================

    /// Idempotent upsert; write-through to the cache and the per-layer
    /// storage gauge.
    pub async fn register_partition(&self, partition: &DataPartition) -> Result<()> {
        self.store.register_partition(partition).await?;

        if let Some(caches) = &self.caches {
            caches
                .partitions
                .insert(partition.partition_id.clone(), partition.clone())
                .await;
        }

        metrics::STORAGE_SIZE_BYTES
            .with_label_values(&[partition.layer.as_str()])
            .add(partition.size_bytes as i64);
        Ok(())
    }

    /// Cache-first lookup; a durable-store fallback hit refreshes the cache.
    pub async fn get_partition(&self, partition_id: &str) -> Result<Option<DataPartition>> {
        if let Some(caches) = &self.caches {
            if let Some(partition) = caches.partitions.get(partition_id).await {
                metrics::CACHE_HITS_TOTAL.inc();
                return Ok(Some(partition));
            }
            metrics::CACHE_MISSES_TOTAL.inc();
        }

        let partition = self.store.get_partition(partition_id).await?;
        if let (Some(caches), Some(partition)) = (&self.caches, &partition) {
            caches
                .partitions
                .insert(partition_id.to_string(), partition.clone())
                .await;
        }
        Ok(partition)
    }

    /// Always served by the durable store (correctness-critical listing).
    pub async fn find_partitions(
        &self,
        schema_name: Option<&str>,
        layer: LakeLayer,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<DataPartition>> {
        self.store.find_partitions(schema_name, layer, filters).await
    }

    /// Remove the metadata row and the cache entry. Payload deletion is the
    /// caller's job and must happen before this call (a dangling metadata
    /// row is recoverable; a dangling file with no metadata is not).
    pub async fn remove_partition(&self, partition: &DataPartition) -> Result<()> {
        self.store.remove_partition(&partition.partition_id).await?;

        if let Some(caches) = &self.caches {
            caches.partitions.invalidate(&partition.partition_id).await;
        }

        metrics::STORAGE_SIZE_BYTES
            .with_label_values(&[partition.layer.as_str()])
            .sub(partition.size_bytes as i64);
        Ok(())
    }

    pub async fn layer_stats(&self) -> Result<Vec<LayerStats>> {
        self.store.layer_stats().await
    }

    /// Recompute the per-layer gauges from the durable store. Called by the
    /// maintenance task so drift from incremental add/sub never persists.
    pub async fn refresh_layer_gauges(&self) -> Result<Vec<LayerStats>> {
        let stats = self.store.layer_stats().await?;
        for layer in LakeLayer::ALL {
            let entry = stats.iter().find(|s| s.layer == layer.as_str());
            metrics::STORAGE_SIZE_BYTES
                .with_label_values(&[layer.as_str()])
                .set(entry.map(|s| s.total_bytes as i64).unwrap_or(0));
            metrics::PARTITIONS_TOTAL
                .with_label_values(&[layer.as_str()])
                .set(entry.map(|s| s.partition_count as i64).unwrap_or(0));
        }
        Ok(stats)
    }

    // ============================================================
    // LINEAGE + HEALTH
    // ============================================================

    pub async fn record_lineage(&self, record: &LineageRecord) -> Result<()> {
        self.store.record_lineage(record).await
    }

    pub async fn get_lineage(&self, target_partition_id: &str) -> Result<Vec<LineageRecord>> {
        self.store.get_lineage(target_partition_id).await
    }

    pub async fn healthy(&self) -> Result<()> {
        self.store.healthy().await
    }
}
