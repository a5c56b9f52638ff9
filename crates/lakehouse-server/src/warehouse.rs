//! LakeWarehouse Orchestrator
//!
//! [`LakeWarehouse`] composes the catalog, storage backend, transformer,
//! validator, encryption codec and stream gateway into the five operations
//! the outside world sees: `ingest_batch`, `query`, `optimize_storage`,
//! `start_streaming` and `health` (plus layer promotion).
//!
//! It is an explicit context object: constructed once at process start and
//! passed by `Arc` into every request handler and background task. There is
//! no global instance - tests build a fresh warehouse each.
//!
//! ## Ingestion Pipeline
//!
//! ```text
//! input ──materialize──▶ validate ──standardize──▶ deduplicate
//!       ──▶ encode + checksum ──▶ storage write ──▶ catalog register
//! ```
//!
//! Validation and transformation are CPU-bound and run on the blocking
//! thread pool so large batches never stall the async executor. The write
//! happens strictly before registration: a crash between the two leaves an
//! orphan file (reconciled by the maintenance sweep), never orphan metadata.
//!
//! ## Crash Safety of Maintenance
//!
//! Compaction and archival always write-and-register the new partition
//! before removing sources. A crash mid-operation leaves duplicate data,
//! never lost data; the next run converges.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use lakehouse_catalog::{CachedCatalog, LayerStats, LineageRecord};
use lakehouse_core::batch::{checksum_bytes, Batch};
use lakehouse_core::partition::{derive_partition_id, storage_key};
use lakehouse_core::{
    BatchInput, DataFormat, DataPartition, DataSchema, EncryptionCodec, IngestionConfig, LakeLayer,
};
use lakehouse_observability::metrics;
use lakehouse_storage::{format, PartitionStore};
use lakehouse_stream::{StreamGateway, StreamMessage};
use lakehouse_transform::{QualityValidator, Transformer};

use crate::error::{Result, WarehouseError};
use crate::query::{
    apply_row_filters, equality_predicates, partition_predicates, row_filters, QueryResult,
    QuerySpec,
};

/// Tunables for the request and maintenance paths.
#[derive(Debug, Clone)]
pub struct WarehouseOptions {
    /// Bounded query fan-in: partitions loaded per query
    pub query_max_partitions: usize,
    /// Partitions below this size are compaction candidates
    pub compaction_threshold_bytes: u64,
    /// Retention applied when a schema declares none
    pub default_retention: Duration,
    /// Unregistered storage files younger than this are left alone
    pub orphan_grace: Duration,
}

impl Default for WarehouseOptions {
    fn default() -> Self {
        Self {
            query_max_partitions: 10,
            compaction_threshold_bytes: 100 * 1024 * 1024, // 100 MiB
            default_retention: Duration::from_secs(90 * 24 * 3600), // 90 days
            orphan_grace: Duration::from_secs(3600), // 1 hour
        }
    }
}

/// Outcome of one `optimize_storage` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizeReport {
    /// Compaction groups merged
    pub compacted_groups: usize,
    /// Source partitions removed by compaction
    pub partitions_compacted: usize,
    /// Partitions moved into the archive layer
    pub partitions_archived: usize,
    /// Archive partitions removed by retention
    pub retention_removed: usize,
    /// Orphan storage files removed
    pub orphans_removed: usize,
    /// Post-run layer statistics
    pub layers: Vec<LayerStats>,
}

/// Overall system health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Durable store answers but the cache layer is absent: every read is a
    /// cache miss, correctness unaffected.
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub cache_enabled: bool,
    pub layers: Vec<LayerStats>,
    pub total_bytes: u64,
    pub total_records: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The orchestrator. Share via `Arc`; every method takes `&self`.
pub struct LakeWarehouse {
    catalog: Arc<CachedCatalog>,
    storage: Arc<PartitionStore>,
    gateway: Arc<StreamGateway>,
    transformer: Transformer,
    validator: QualityValidator,
    encryption: Option<EncryptionCodec>,
    options: WarehouseOptions,
}

impl LakeWarehouse {
    pub fn new(
        catalog: Arc<CachedCatalog>,
        storage: Arc<PartitionStore>,
        gateway: Arc<StreamGateway>,
        encryption: Option<EncryptionCodec>,
        options: WarehouseOptions,
    ) -> Self {
        Self {
            catalog,
            storage,
            gateway,
            transformer: Transformer::new(),
            validator: QualityValidator::new(),
            encryption,
            options,
        }
    }

    pub fn catalog(&self) -> &Arc<CachedCatalog> {
        &self.catalog
    }

    pub fn storage(&self) -> &Arc<PartitionStore> {
        &self.storage
    }

    pub fn gateway(&self) -> &Arc<StreamGateway> {
        &self.gateway
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    // ============================================================
    // INGESTION
    // ============================================================

    /// Ingest one batch under `config`. Returns the new partition ID, or
    /// `None` for an empty batch (a no-op, not an error).
    ///
    /// All-or-nothing: a validation or storage failure persists nothing.
    pub async fn ingest_batch(
        &self,
        input: BatchInput,
        config: &IngestionConfig,
    ) -> Result<Option<String>> {
        let started = Instant::now();

        let batch = self.materialize(input, config.data_format).await?;
        if batch.is_empty() {
            tracing::debug!(source = %config.source_name, "Empty batch, nothing to ingest");
            return Ok(None);
        }
        let source = config.source_name.clone();
        let format_label = config.data_format.as_str();

        // Validation + transformation + encode are CPU-bound; keep them off
        // the async executor.
        let schema = config.schema.clone();
        let transformer = self.transformer.clone();
        let validator = self.validator.clone();
        let encryption = self.encryption.clone();
        let enable_checks = config.enable_quality_checks;
        let enable_dedup = config.enable_deduplication;
        let data_format = config.data_format;

        let (batch, encoded) = tokio::task::spawn_blocking(
            move || -> Result<(Batch, Vec<u8>)> {
                let report = validator.validate(&batch, &schema);
                for warning in &report.warnings {
                    tracing::warn!(schema = %schema.name, warning = %warning, "Schema drift");
                }
                if !report.valid && enable_checks {
                    metrics::INGEST_REJECTED_TOTAL
                        .with_label_values(&[schema.name.as_str()])
                        .inc();
                    return Err(WarehouseError::SchemaValidation {
                        errors: report.errors,
                    });
                }

                let batch = transformer.standardize(batch, &schema, encryption.as_ref())?;
                let batch = if enable_dedup {
                    transformer.deduplicate(batch)?
                } else {
                    batch
                };

                let encoded = format::encode_batch(&batch, data_format)
                    .map_err(WarehouseError::StorageWrite)?;
                Ok((batch, encoded))
            },
        )
        .await?
        .map_err(WarehouseError::observed)?;

        // Derive the partition. The checksum component keeps IDs distinct
        // for distinct content within the same second, while a byte-equal
        // retry maps to the same ID and the catalog's idempotent upsert.
        let checksum = checksum_bytes(&encoded);
        let created_at = Self::now_ms();
        let partition_values = uniform_partition_values(&batch, &config.schema);
        let partition_id = derive_partition_id(
            &config.source_name,
            LakeLayer::Raw,
            &partition_values,
            created_at,
            &checksum,
        );
        let path = storage_key(LakeLayer::Raw, &config.schema.name, &partition_id);

        // Bytes first; a failure here aborts before any metadata exists.
        let size_bytes = self
            .storage
            .write_bytes(&encoded, &path, config.compression)
            .await
            .map_err(|e| WarehouseError::StorageWrite(e).observed())?;

        let partition = DataPartition {
            partition_id: partition_id.clone(),
            layer: LakeLayer::Raw,
            schema_name: config.schema.name.clone(),
            partition_values,
            storage_path: path,
            format: config.data_format,
            compression: config.compression,
            record_count: batch.len() as u64,
            size_bytes,
            created_at,
            last_modified_at: created_at,
            checksum,
        };
        self.catalog
            .register_partition(&partition)
            .await
            .map_err(|e| WarehouseError::from(e).observed())?;

        metrics::INGEST_RECORDS_TOTAL
            .with_label_values(&[source.as_str(), format_label])
            .inc_by(batch.len() as u64);
        metrics::INGEST_BATCHES_TOTAL
            .with_label_values(&[source.as_str(), format_label])
            .inc();
        metrics::OPERATION_LATENCY
            .with_label_values(&["ingest"])
            .observe(started.elapsed().as_secs_f64());

        tracing::info!(
            source = %source,
            partition_id = %partition_id,
            records = batch.len(),
            bytes = size_bytes,
            "Ingested batch"
        );
        Ok(Some(partition_id))
    }

    async fn materialize(&self, input: BatchInput, data_format: DataFormat) -> Result<Batch> {
        match input {
            BatchInput::Rows(rows) => Ok(Batch::from_rows(rows)),
            BatchInput::Record(row) => Ok(Batch::from_record(row)),
            BatchInput::File(path) => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| {
                    WarehouseError::InvalidInput(format!(
                        "cannot read input file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                format::decode_batch(&bytes, data_format)
                    .map_err(|e| WarehouseError::InvalidInput(e.to_string()))
            }
        }
    }

    // ============================================================
    // QUERY
    // ============================================================

    /// Query one layer. Partition pruning happens at the metadata level;
    /// unreadable partitions are skipped with a warning (partial results
    /// beat total failure on the read path).
    pub async fn query(&self, spec: QuerySpec) -> Result<QueryResult> {
        let started = Instant::now();

        let partition_preds = partition_predicates(&spec.filters);
        let equality_preds = equality_predicates(&spec.filters);
        let row_preds = row_filters(&spec.filters);

        let candidates = self
            .catalog
            .find_partitions(spec.schema_name.as_deref(), spec.layer, &partition_preds)
            .await
            .map_err(|e| WarehouseError::from(e).observed())?;

        // Best-effort pruning with scalar equality filters; row filters are
        // re-applied below so this can never change results.
        let selected: Vec<&DataPartition> = candidates
            .iter()
            .filter(|p| p.could_contain(&equality_preds))
            .take(self.options.query_max_partitions)
            .collect();

        let mut batches = Vec::with_capacity(selected.len());
        let mut partitions_scanned = 0usize;
        for partition in &selected {
            partitions_scanned += 1;
            match self.load_partition(partition).await {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    metrics::ERRORS_TOTAL
                        .with_label_values(&["storage_read"])
                        .inc();
                    tracing::warn!(
                        partition_id = %partition.partition_id,
                        error = %e,
                        "Skipping unreadable partition"
                    );
                }
            }
        }

        let mut result = apply_row_filters(Batch::concat(batches), &row_preds);
        if let Some(aggregations) = &spec.aggregations {
            result = self
                .transformer
                .aggregate(result, aggregations)
                .map_err(|e| WarehouseError::from(e).observed())?;
        }
        result.truncate(spec.limit);

        metrics::QUERY_TOTAL
            .with_label_values(&[spec.layer.as_str()])
            .inc();
        metrics::QUERY_PARTITIONS_SCANNED
            .with_label_values(&[spec.layer.as_str()])
            .observe(partitions_scanned as f64);
        metrics::OPERATION_LATENCY
            .with_label_values(&["query"])
            .observe(started.elapsed().as_secs_f64());

        Ok(QueryResult {
            record_count: result.len(),
            data: result,
            partitions_scanned,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Load and verify one partition's payload.
    async fn load_partition(&self, partition: &DataPartition) -> Result<Batch> {
        let bytes = self
            .storage
            .read_bytes(
                &partition.storage_path,
                partition.compression,
                Some(&partition.checksum),
            )
            .await
            .map_err(WarehouseError::StorageRead)?;
        format::decode_batch(&bytes, partition.format).map_err(WarehouseError::StorageRead)
    }

    // ============================================================
    // LAYER PROMOTION
    // ============================================================

    /// Derive partitions in the next pipeline layer from every partition of
    /// `schema_name` in `from`. Raw -> Cleaned applies null handling and
    /// deduplication; Cleaned -> Curated applies outlier annotation.
    /// Source partitions are retained (immutable history); retention
    /// eventually archives them.
    pub async fn promote_partitions(
        &self,
        schema_name: &str,
        from: LakeLayer,
    ) -> Result<Vec<String>> {
        let started = Instant::now();
        let target = from
            .next()
            .ok_or_else(|| WarehouseError::InvalidPromotion(from.to_string()))?;
        let transformations: &[&str] = match target {
            LakeLayer::Cleaned => &["handle_nulls", "deduplicate"],
            LakeLayer::Curated => &["detect_outliers"],
            _ => &[],
        };

        let sources = self
            .catalog
            .find_partitions(Some(schema_name), from, &BTreeMap::new())
            .await?;

        let mut promoted = Vec::new();
        for source in sources {
            let batch = match self.load_partition(&source).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(
                        partition_id = %source.partition_id,
                        error = %e,
                        "Skipping unreadable partition during promotion"
                    );
                    continue;
                }
            };

            let transformer = self.transformer.clone();
            let names: Vec<&'static str> = transformations.to_vec();
            let transformed = tokio::task::spawn_blocking(move || {
                transformer.apply_all(&names, batch, &Default::default())
            })
            .await??;

            let new_id = self
                .write_derived(
                    &transformed,
                    &source,
                    target,
                    source.created_at,
                    &format!("promote_to_{}", target),
                )
                .await?;
            promoted.push(new_id);
        }

        metrics::OPERATION_LATENCY
            .with_label_values(&["promote"])
            .observe(started.elapsed().as_secs_f64());
        Ok(promoted)
    }

    /// Write + register a partition derived from `source` in `layer`, with
    /// a lineage record. The source is not touched.
    async fn write_derived(
        &self,
        batch: &Batch,
        source: &DataPartition,
        layer: LakeLayer,
        created_at: i64,
        transformation: &str,
    ) -> Result<String> {
        let encoded =
            format::encode_batch(batch, source.format).map_err(WarehouseError::StorageWrite)?;
        let checksum = checksum_bytes(&encoded);
        let partition_id = derive_partition_id(
            &source.schema_name,
            layer,
            &source.partition_values,
            created_at,
            &checksum,
        );
        let path = storage_key(layer, &source.schema_name, &partition_id);

        let size_bytes = self
            .storage
            .write_bytes(&encoded, &path, source.compression)
            .await
            .map_err(|e| WarehouseError::StorageWrite(e).observed())?;

        let partition = DataPartition {
            partition_id: partition_id.clone(),
            layer,
            schema_name: source.schema_name.clone(),
            partition_values: source.partition_values.clone(),
            storage_path: path,
            format: source.format,
            compression: source.compression,
            record_count: batch.len() as u64,
            size_bytes,
            created_at,
            last_modified_at: Self::now_ms(),
            checksum,
        };
        self.catalog.register_partition(&partition).await?;
        self.catalog
            .record_lineage(&LineageRecord {
                target_partition_id: partition_id.clone(),
                source_partition_ids: vec![source.partition_id.clone()],
                transformation: transformation.to_string(),
                processed_at: Self::now_ms(),
            })
            .await?;
        Ok(partition_id)
    }

    // ============================================================
    // STORAGE OPTIMIZATION (maintenance path)
    // ============================================================

    /// Compaction, archival, retention cleanup, orphan reconciliation and
    /// a gauge refresh. Safe to cancel at any await point: new data is
    /// always written and registered before old data is removed.
    pub async fn optimize_storage(&self) -> Result<OptimizeReport> {
        let started = Instant::now();
        let mut report = OptimizeReport::default();

        self.run_compaction(&mut report).await?;
        self.run_archival(&mut report).await?;
        self.run_retention(&mut report).await?;
        self.run_orphan_sweep(&mut report).await?;

        report.layers = self.catalog.refresh_layer_gauges().await?;

        metrics::OPERATION_LATENCY
            .with_label_values(&["optimize"])
            .observe(started.elapsed().as_secs_f64());
        tracing::info!(
            compacted_groups = report.compacted_groups,
            partitions_compacted = report.partitions_compacted,
            archived = report.partitions_archived,
            retention_removed = report.retention_removed,
            orphans_removed = report.orphans_removed,
            "Storage optimization complete"
        );
        Ok(report)
    }

    /// Merge groups of small partitions. Grouping key: (schema, format,
    /// compression) within one layer - mixed-codec groups are never merged.
    async fn run_compaction(&self, report: &mut OptimizeReport) -> Result<()> {
        for layer in [LakeLayer::Raw, LakeLayer::Cleaned, LakeLayer::Curated] {
            let partitions = self
                .catalog
                .find_partitions(None, layer, &BTreeMap::new())
                .await?;

            let mut groups: HashMap<(String, &'static str, &'static str), Vec<DataPartition>> =
                HashMap::new();
            for partition in partitions {
                if partition.size_bytes < self.options.compaction_threshold_bytes {
                    groups
                        .entry((
                            partition.schema_name.clone(),
                            partition.format.as_str(),
                            partition.compression.as_str(),
                        ))
                        .or_default()
                        .push(partition);
                }
            }

            for (_, group) in groups {
                if group.len() < 2 {
                    continue;
                }
                if let Err(e) = self.compact_group(layer, &group, report).await {
                    // One failed group must not stop the rest of the run.
                    tracing::warn!(layer = %layer, error = %e, "Compaction group failed");
                }
            }
        }
        Ok(())
    }

    async fn compact_group(
        &self,
        layer: LakeLayer,
        group: &[DataPartition],
        report: &mut OptimizeReport,
    ) -> Result<()> {
        let mut loaded = Vec::with_capacity(group.len());
        for partition in group {
            // An unreadable member poisons the whole group for this run;
            // merging a partial group would silently drop its rows.
            loaded.push(self.load_partition(partition).await?);
        }
        let merged = Batch::concat(loaded);

        // Keep only partition-key values every member agrees on.
        let mut shared_values = group[0].partition_values.clone();
        for partition in &group[1..] {
            shared_values.retain(|key, value| {
                partition
                    .partition_values
                    .get(key)
                    .map(|v| *v == *value)
                    .unwrap_or(false)
            });
        }

        let template = &group[0];
        let encoded =
            format::encode_batch(&merged, template.format).map_err(WarehouseError::StorageWrite)?;
        let checksum = checksum_bytes(&encoded);
        let created_at = Self::now_ms();
        let partition_id = derive_partition_id(
            &template.schema_name,
            layer,
            &shared_values,
            created_at,
            &checksum,
        );
        let path = storage_key(layer, &template.schema_name, &partition_id);

        // Crash safety: the merged partition is fully written AND
        // registered before any original is removed. A crash in between
        // leaves duplicates, never loss.
        let size_bytes = self
            .storage
            .write_bytes(&encoded, &path, template.compression)
            .await
            .map_err(|e| WarehouseError::StorageWrite(e).observed())?;
        let merged_partition = DataPartition {
            partition_id: partition_id.clone(),
            layer,
            schema_name: template.schema_name.clone(),
            partition_values: shared_values,
            storage_path: path,
            format: template.format,
            compression: template.compression,
            record_count: merged.len() as u64,
            size_bytes,
            created_at,
            last_modified_at: created_at,
            checksum,
        };
        self.catalog.register_partition(&merged_partition).await?;
        self.catalog
            .record_lineage(&LineageRecord {
                target_partition_id: partition_id.clone(),
                source_partition_ids: group.iter().map(|p| p.partition_id.clone()).collect(),
                transformation: "compaction".to_string(),
                processed_at: created_at,
            })
            .await?;

        for partition in group {
            self.remove_partition_best_effort(partition).await;
        }

        report.compacted_groups += 1;
        report.partitions_compacted += group.len();
        metrics::COMPACTED_PARTITIONS_TOTAL.inc_by(group.len() as u64);
        tracing::info!(
            layer = %layer,
            merged = %partition_id,
            sources = group.len(),
            records = merged_partition.record_count,
            "Compacted partitions"
        );
        Ok(())
    }

    /// Move partitions past their retention age into the archive layer.
    /// The archive copy keeps the source's `created_at`, so true age is
    /// preserved; `last_modified_at` records the archival time, which is
    /// what retention cleanup measures against.
    async fn run_archival(&self, report: &mut OptimizeReport) -> Result<()> {
        let now = Self::now_ms();
        for layer in [LakeLayer::Raw, LakeLayer::Cleaned, LakeLayer::Curated] {
            let partitions = self
                .catalog
                .find_partitions(None, layer, &BTreeMap::new())
                .await?;
            for partition in partitions {
                let retention = self.retention_for(&partition.schema_name).await?;
                let age_ms = now.saturating_sub(partition.created_at);
                if age_ms <= retention.as_millis() as i64 {
                    continue;
                }

                let batch = match self.load_partition(&partition).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::warn!(
                            partition_id = %partition.partition_id,
                            error = %e,
                            "Skipping unreadable partition during archival"
                        );
                        continue;
                    }
                };
                self.write_derived(
                    &batch,
                    &partition,
                    LakeLayer::Archive,
                    partition.created_at,
                    "archive",
                )
                .await?;
                self.remove_partition_best_effort(&partition).await;
                report.partitions_archived += 1;
            }
        }
        Ok(())
    }

    /// Remove archive partitions one retention period after archival.
    async fn run_retention(&self, report: &mut OptimizeReport) -> Result<()> {
        let now = Self::now_ms();
        let archived = self
            .catalog
            .find_partitions(None, LakeLayer::Archive, &BTreeMap::new())
            .await?;
        for partition in archived {
            let retention = self.retention_for(&partition.schema_name).await?;
            let archived_for_ms = now.saturating_sub(partition.last_modified_at);
            if archived_for_ms > retention.as_millis() as i64 {
                self.remove_partition_best_effort(&partition).await;
                report.retention_removed += 1;
                metrics::RETENTION_REMOVED_TOTAL.inc();
            }
        }
        Ok(())
    }

    /// Reconcile storage against the catalog: files with no metadata row
    /// and older than the grace period are deleted. The grace period keeps
    /// in-flight writes (payload written, registration pending) safe.
    async fn run_orphan_sweep(&self, report: &mut OptimizeReport) -> Result<()> {
        let mut known: HashSet<String> = HashSet::new();
        for layer in LakeLayer::ALL {
            for partition in self
                .catalog
                .find_partitions(None, layer, &BTreeMap::new())
                .await?
            {
                known.insert(partition.storage_path);
            }
        }

        let objects = match self.storage.list(None).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(error = %e, "Storage listing failed, skipping orphan sweep");
                return Ok(());
            }
        };

        let grace = chrono::Duration::from_std(self.options.orphan_grace)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let cutoff = chrono::Utc::now() - grace;
        for object in objects {
            let key = object.location.to_string();
            if known.contains(&key) || object.last_modified > cutoff {
                continue;
            }
            match self.storage.delete(&key).await {
                Ok(()) => {
                    report.orphans_removed += 1;
                    tracing::info!(key = %key, "Removed orphan storage file");
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "Failed to remove orphan"),
            }
        }
        Ok(())
    }

    async fn retention_for(&self, schema_name: &str) -> Result<Duration> {
        let schema = self.catalog.get_schema(schema_name).await?;
        Ok(schema
            .and_then(|s| s.retention())
            .unwrap_or(self.options.default_retention))
    }

    /// Delete bytes then metadata, logging instead of failing: both halves
    /// are retried by later runs if one is missed.
    async fn remove_partition_best_effort(&self, partition: &DataPartition) {
        if let Err(e) = self.storage.delete(&partition.storage_path).await {
            tracing::warn!(
                partition_id = %partition.partition_id,
                error = %e,
                "Failed to delete partition payload"
            );
        }
        if let Err(e) = self.catalog.remove_partition(partition).await {
            tracing::warn!(
                partition_id = %partition.partition_id,
                error = %e,
                "Failed to remove partition metadata"
            );
        }
    }

    // ============================================================
    // STREAMING
    // ============================================================

    /// Register an ingest handler per topic and spawn its consume loop.
    /// Array payloads become multi-row batches, object payloads single
    /// records. Handler failures are isolated per message by the gateway.
    pub async fn start_streaming(
        self: &Arc<Self>,
        sources: Vec<(String, IngestionConfig)>,
    ) -> Vec<tokio::task::JoinHandle<lakehouse_stream::Result<()>>> {
        let mut handles = Vec::with_capacity(sources.len());
        for (topic, config) in sources {
            let warehouse = self.clone();
            self.gateway
                .register_handler(&topic, move |message: StreamMessage| {
                    let warehouse = warehouse.clone();
                    let config = config.clone();
                    Box::pin(async move {
                        let input = match message.payload {
                            Value::Array(items) => BatchInput::Rows(
                                items
                                    .into_iter()
                                    .filter_map(|item| item.as_object().cloned())
                                    .collect(),
                            ),
                            Value::Object(map) => BatchInput::Record(map),
                            other => {
                                return Err(format!(
                                    "unsupported stream payload shape: {}",
                                    other
                                )
                                .into())
                            }
                        };
                        warehouse
                            .ingest_batch(input, &config)
                            .await
                            .map(|_| ())
                            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                                Box::new(e)
                            })
                    })
                })
                .await;

            handles.push(
                self.gateway
                    .spawn_consumer(topic, "lakehouse-ingest".to_string()),
            );
        }
        handles
    }

    // ============================================================
    // HEALTH
    // ============================================================

    /// Probe the catalog and summarize per-layer storage. Never fails: a
    /// broken store reports as `Unhealthy`, a missing cache as `Degraded`.
    pub async fn health(&self) -> HealthReport {
        if let Err(e) = self.catalog.healthy().await {
            return HealthReport {
                status: HealthStatus::Unhealthy,
                cache_enabled: self.catalog.cache_enabled(),
                layers: Vec::new(),
                total_bytes: 0,
                total_records: 0,
                detail: Some(e.to_string()),
            };
        }

        let layers = self.catalog.layer_stats().await.unwrap_or_default();
        let total_bytes = layers.iter().map(|s| s.total_bytes).sum();
        let total_records = layers.iter().map(|s| s.total_records).sum();

        let status = if self.catalog.cache_enabled() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            cache_enabled: self.catalog.cache_enabled(),
            layers,
            total_bytes,
            total_records,
            detail: None,
        }
    }
}

/// Partition-key values for a batch: a key is recorded only when every row
/// agrees on one non-null value. Mixed batches stay unprunable on that key,
/// which is correct - row filters still apply at query time.
fn uniform_partition_values(batch: &Batch, schema: &DataSchema) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for key in &schema.partition_keys {
        let column = batch.column_values(key);
        let mut iter = column.iter();
        let Some(first) = iter.next() else { continue };
        if first.is_null() {
            continue;
        }
        if iter.all(|v| v == first) {
            let text = match first {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            values.insert(key.clone(), text);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakehouse_core::batch::row;
    use lakehouse_core::FieldType;
    use serde_json::json;

    fn schema_with_partition_key() -> DataSchema {
        let mut fields = BTreeMap::new();
        fields.insert("user_id".to_string(), FieldType::String);
        fields.insert("event_type".to_string(), FieldType::String);
        let mut schema = DataSchema::new("events", fields);
        schema.partition_keys = vec!["event_type".to_string()];
        schema
    }

    // Uniform batches record the key; mixed batches omit it
    #[test]
    fn test_uniform_partition_values() {
        let schema = schema_with_partition_key();

        let uniform = Batch::from_rows(vec![
            row(&[("user_id", json!("u1")), ("event_type", json!("click"))]),
            row(&[("user_id", json!("u2")), ("event_type", json!("click"))]),
        ]);
        let values = uniform_partition_values(&uniform, &schema);
        assert_eq!(values.get("event_type").map(String::as_str), Some("click"));

        let mixed = Batch::from_rows(vec![
            row(&[("user_id", json!("u1")), ("event_type", json!("click"))]),
            row(&[("user_id", json!("u2")), ("event_type", json!("view"))]),
        ]);
        assert!(uniform_partition_values(&mixed, &schema).is_empty());
    }
}
