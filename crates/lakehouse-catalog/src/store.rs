//! Catalog Store Trait
//!
//! The [`CatalogStore`] trait abstracts the durable metadata backend. The
//! shipped implementation is SQLite ([`crate::SqliteCatalogStore`]); the
//! trait keeps a Postgres move possible without touching callers.
//!
//! ## Contract Notes
//!
//! - `register_schema` is append-only: every call inserts a new version row,
//!   versions increase monotonically per name, history is never deleted.
//! - `register_partition` is an idempotent upsert by partition ID:
//!   re-registering updates size/count/checksum/last-modified and preserves
//!   `created_at`. This is what makes at-least-once ingestion retries safe.
//! - `find_partitions` returns newest-first and applies partition-key
//!   predicates so callers can prune before loading any payload.
//! - Same-ID concurrent writers race on last-write-wins; distinct IDs never
//!   contend (IDs are derived independently per batch).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lakehouse_core::{DataPartition, DataSchema, LakeLayer};

use crate::error::Result;

/// Aggregate storage statistics for one layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerStats {
    pub layer: String,
    pub partition_count: u64,
    pub total_bytes: u64,
    pub total_records: u64,
}

/// One derivation step: `target` was produced from `sources` by
/// `transformation`. Append-only, like schema history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub target_partition_id: String,
    pub source_partition_ids: Vec<String>,
    pub transformation: String,
    /// Milliseconds since Unix epoch
    pub processed_at: i64,
}

/// Durable metadata backend.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // ============================================================
    // SCHEMA OPERATIONS
    // ============================================================

    /// Append a new version of `schema` and return the assigned version
    /// number (starting at 1 for a new name).
    ///
    /// # Errors
    ///
    /// - `InvalidSchema`: the schema violates its own invariants
    /// - `Database`: the store is unreachable or the insert failed
    async fn register_schema(&self, schema: &DataSchema) -> Result<u32>;

    /// Latest version of the named schema, or `None` if never registered.
    async fn get_schema(&self, name: &str) -> Result<Option<DataSchema>>;

    /// A specific historical version.
    async fn get_schema_version(&self, name: &str, version: u32) -> Result<Option<DataSchema>>;

    /// Latest version of every registered schema.
    async fn list_schemas(&self) -> Result<Vec<DataSchema>>;

    // ============================================================
    // PARTITION OPERATIONS
    // ============================================================

    /// Idempotent upsert by `partition_id`. On conflict, updates
    /// `record_count`, `size_bytes`, `checksum`, `storage_path` and
    /// `last_modified_at`; `created_at` and identity fields are preserved.
    async fn register_partition(&self, partition: &DataPartition) -> Result<()>;

    /// Fetch one partition by ID.
    async fn get_partition(&self, partition_id: &str) -> Result<Option<DataPartition>>;

    /// Partitions in `layer`, optionally restricted to one schema, matching
    /// every partition-key predicate in `filters`. Newest-first.
    async fn find_partitions(
        &self,
        schema_name: Option<&str>,
        layer: LakeLayer,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<DataPartition>>;

    /// Delete the metadata row. Payload bytes are the storage backend's
    /// business - callers orchestrate the deletion order.
    async fn remove_partition(&self, partition_id: &str) -> Result<()>;

    /// Per-layer partition counts, byte and record totals.
    async fn layer_stats(&self) -> Result<Vec<LayerStats>>;

    // ============================================================
    // LINEAGE OPERATIONS
    // ============================================================

    /// Append one lineage record.
    async fn record_lineage(&self, record: &LineageRecord) -> Result<()>;

    /// All lineage records that produced `target_partition_id`.
    async fn get_lineage(&self, target_partition_id: &str) -> Result<Vec<LineageRecord>>;

    // ============================================================
    // HEALTH
    // ============================================================

    /// Cheap liveness probe against the durable store.
    async fn healthy(&self) -> Result<()>;
}
