//! SQLite Catalog Store Implementation
//!
//! Durable metadata storage on SQLite via the SQLx connection pool.
//!
//! ## Why SQLite?
//!
//! For a single-node deployment SQLite is ideal: embedded, zero
//! configuration, ACID, and fast enough that catalog lookups never show up
//! in a profile (indexed reads are well under a millisecond). The
//! [`CatalogStore`] trait keeps a later Postgres migration mechanical.
//!
//! ## Tables
//!
//! - `schemas(name, version, definition, created_at)` - append-only version
//!   history; `definition` is the full schema as JSON
//! - `partitions(partition_id, layer, schema_name, partition_values, ...)` -
//!   one row per stored payload; `partition_values` is a JSON object
//! - `lineage(target_partition_id, source_partition_ids, transformation,
//!   processed_at)` - append-only derivation log
//!
//! Tables are created on connect with `CREATE TABLE IF NOT EXISTS`, so a
//! fresh database file bootstraps itself.
//!
//! ## Thread Safety
//!
//! The store is `Send + Sync` and is shared via `Arc`. The pool handles
//! connection lifecycle; SQLite WAL mode allows concurrent readers.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use lakehouse_core::{Compression, DataFormat, DataPartition, DataSchema, LakeLayer};

use crate::error::{CatalogError, Result};
use crate::store::{CatalogStore, LayerStats, LineageRecord};

/// SQLite-backed catalog store.
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    /// Open (or create) a catalog database file.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            path.as_ref().display()
        ))?
        .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    /// In-memory database for testing. Pinned to a single pooled connection
    /// so the database survives for the pool's lifetime.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schemas (
                name        TEXT NOT NULL,
                version     INTEGER NOT NULL,
                definition  TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (name, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS partitions (
                partition_id     TEXT PRIMARY KEY,
                layer            TEXT NOT NULL,
                schema_name      TEXT NOT NULL,
                partition_values TEXT NOT NULL,
                storage_path     TEXT NOT NULL,
                data_format      TEXT NOT NULL,
                compression      TEXT NOT NULL,
                record_count     INTEGER NOT NULL,
                size_bytes       INTEGER NOT NULL,
                created_at       INTEGER NOT NULL,
                last_modified_at INTEGER NOT NULL,
                checksum         TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_partitions_layer_schema
             ON partitions (layer, schema_name, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lineage (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                target_partition_id  TEXT NOT NULL,
                source_partition_ids TEXT NOT NULL,
                transformation       TEXT NOT NULL,
                processed_at         INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_lineage_target
             ON lineage (target_partition_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn row_to_partition(row: &SqliteRow) -> Result<DataPartition> {
        let layer_text: String = row.try_get("layer")?;
        let layer = LakeLayer::parse(&layer_text)
            .ok_or_else(|| CatalogError::Corrupt(format!("unknown layer '{}'", layer_text)))?;
        let values_json: String = row.try_get("partition_values")?;
        let partition_values: BTreeMap<String, String> = serde_json::from_str(&values_json)?;
        let format_text: String = row.try_get("data_format")?;
        let format = DataFormat::parse(&format_text)
            .ok_or_else(|| CatalogError::Corrupt(format!("unknown format '{}'", format_text)))?;
        let compression_text: String = row.try_get("compression")?;
        let compression = Compression::parse(&compression_text).ok_or_else(|| {
            CatalogError::Corrupt(format!("unknown compression '{}'", compression_text))
        })?;

        Ok(DataPartition {
            partition_id: row.try_get("partition_id")?,
            layer,
            schema_name: row.try_get("schema_name")?,
            partition_values,
            storage_path: row.try_get("storage_path")?,
            format,
            compression,
            record_count: row.try_get::<i64, _>("record_count")? as u64,
            size_bytes: row.try_get::<i64, _>("size_bytes")? as u64,
            created_at: row.try_get("created_at")?,
            last_modified_at: row.try_get("last_modified_at")?,
            checksum: row.try_get("checksum")?,
        })
    }

    fn row_to_schema(row: &SqliteRow) -> Result<DataSchema> {
        let definition: String = row.try_get("definition")?;
        let mut schema: DataSchema = serde_json::from_str(&definition)?;
        schema.version = row.try_get::<i64, _>("version")? as u32;
        Ok(schema)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn register_schema(&self, schema: &DataSchema) -> Result<u32> {
        schema.validate()?;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schemas WHERE name = ?")
                .bind(&schema.name)
                .fetch_one(&mut *tx)
                .await?;
        let version = (current.unwrap_or(0) + 1) as u32;

        let mut stored = schema.clone();
        stored.version = version;
        let definition = serde_json::to_string(&stored)?;

        sqlx::query(
            "INSERT INTO schemas (name, version, definition, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&schema.name)
        .bind(version as i64)
        .bind(definition)
        .bind(Self::now_ms())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(schema = %schema.name, version, "Registered schema version");
        Ok(version)
    }

    async fn get_schema(&self, name: &str) -> Result<Option<DataSchema>> {
        let row = sqlx::query(
            "SELECT version, definition FROM schemas
             WHERE name = ? ORDER BY version DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_schema).transpose()
    }

    async fn get_schema_version(&self, name: &str, version: u32) -> Result<Option<DataSchema>> {
        let row = sqlx::query("SELECT version, definition FROM schemas WHERE name = ? AND version = ?")
            .bind(name)
            .bind(version as i64)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_schema).transpose()
    }

    async fn list_schemas(&self) -> Result<Vec<DataSchema>> {
        let rows = sqlx::query(
            "SELECT s.version, s.definition
             FROM schemas s
             JOIN (SELECT name, MAX(version) AS latest FROM schemas GROUP BY name) m
               ON s.name = m.name AND s.version = m.latest
             ORDER BY s.name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_schema).collect()
    }

    async fn register_partition(&self, partition: &DataPartition) -> Result<()> {
        let values_json = serde_json::to_string(&partition.partition_values)?;

        sqlx::query(
            r#"
            INSERT INTO partitions
                (partition_id, layer, schema_name, partition_values, storage_path,
                 data_format, compression, record_count, size_bytes, created_at,
                 last_modified_at, checksum)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(partition_id) DO UPDATE SET
                record_count     = excluded.record_count,
                size_bytes       = excluded.size_bytes,
                checksum         = excluded.checksum,
                storage_path     = excluded.storage_path,
                last_modified_at = excluded.last_modified_at
            "#,
        )
        .bind(&partition.partition_id)
        .bind(partition.layer.as_str())
        .bind(&partition.schema_name)
        .bind(values_json)
        .bind(&partition.storage_path)
        .bind(partition.format.as_str())
        .bind(partition.compression.as_str())
        .bind(partition.record_count as i64)
        .bind(partition.size_bytes as i64)
        .bind(partition.created_at)
        .bind(partition.last_modified_at)
        .bind(&partition.checksum)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            partition_id = %partition.partition_id,
            layer = %partition.layer,
            records = partition.record_count,
            "Registered partition"
        );
        Ok(())
    }

    async fn get_partition(&self, partition_id: &str) -> Result<Option<DataPartition>> {
        let row = sqlx::query("SELECT * FROM partitions WHERE partition_id = ?")
            .bind(partition_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_partition).transpose()
    }

    async fn find_partitions(
        &self,
        schema_name: Option<&str>,
        layer: LakeLayer,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<DataPartition>> {
        let rows = match schema_name {
            Some(name) => {
                sqlx::query(
                    "SELECT * FROM partitions
                     WHERE layer = ? AND schema_name = ?
                     ORDER BY created_at DESC",
                )
                .bind(layer.as_str())
                .bind(name)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM partitions WHERE layer = ? ORDER BY created_at DESC",
                )
                .bind(layer.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        // Partition-key predicates are applied here rather than in SQL; the
        // values column is a JSON object and the filter sets are tiny.
        let mut partitions = Vec::with_capacity(rows.len());
        for row in &rows {
            let partition = Self::row_to_partition(row)?;
            if partition.matches_partition_filters(filters) {
                partitions.push(partition);
            }
        }
        Ok(partitions)
    }

    async fn remove_partition(&self, partition_id: &str) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM partitions WHERE partition_id = ?")
            .bind(partition_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(CatalogError::PartitionNotFound(partition_id.to_string()));
        }
        Ok(())
    }

    async fn layer_stats(&self) -> Result<Vec<LayerStats>> {
        let rows = sqlx::query(
            "SELECT layer,
                    COUNT(*)          AS partition_count,
                    SUM(size_bytes)   AS total_bytes,
                    SUM(record_count) AS total_records
             FROM partitions GROUP BY layer",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in rows {
            stats.push(LayerStats {
                layer: row.try_get("layer")?,
                partition_count: row.try_get::<i64, _>("partition_count")? as u64,
                total_bytes: row.try_get::<Option<i64>, _>("total_bytes")?.unwrap_or(0) as u64,
                total_records: row.try_get::<Option<i64>, _>("total_records")?.unwrap_or(0) as u64,
            });
        }
        Ok(stats)
    }

    async fn record_lineage(&self, record: &LineageRecord) -> Result<()> {
        let sources = serde_json::to_string(&record.source_partition_ids)?;
        sqlx::query(
            "INSERT INTO lineage
                 (target_partition_id, source_partition_ids, transformation, processed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&record.target_partition_id)
        .bind(sources)
        .bind(&record.transformation)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_lineage(&self, target_partition_id: &str) -> Result<Vec<LineageRecord>> {
        let rows = sqlx::query(
            "SELECT target_partition_id, source_partition_ids, transformation, processed_at
             FROM lineage WHERE target_partition_id = ? ORDER BY id",
        )
        .bind(target_partition_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let sources_json: String = row.try_get("source_partition_ids")?;
            records.push(LineageRecord {
                target_partition_id: row.try_get("target_partition_id")?,
                source_partition_ids: serde_json::from_str(&sources_json)?,
                transformation: row.try_get("transformation")?,
                processed_at: row.try_get("processed_at")?,
            });
        }
        Ok(records)
    }

    async fn healthy(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
