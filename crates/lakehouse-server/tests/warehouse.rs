//! End-to-end warehouse scenarios over a real (temp-dir) storage backend
//! and an in-memory SQLite catalog.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use lakehouse_catalog::{CacheConfig, CachedCatalog, SqliteCatalogStore};
use lakehouse_core::batch::{checksum_bytes, row};
use lakehouse_core::partition::{derive_partition_id, storage_key};
use lakehouse_core::{
    BatchInput, Compression, DataFormat, DataPartition, DataSchema, EncryptionCodec, FieldType,
    IngestionConfig, LakeLayer, ValidationRule,
};
use lakehouse_server::{HealthStatus, LakeWarehouse, QuerySpec, WarehouseOptions};
use lakehouse_storage::PartitionStore;
use lakehouse_stream::{InMemoryBus, StreamGateway};
use object_store::local::LocalFileSystem;

struct Fixture {
    _dir: tempfile::TempDir,
    warehouse: Arc<LakeWarehouse>,
}

async fn fixture() -> Fixture {
    fixture_with(WarehouseOptions::default(), None, true).await
}

async fn fixture_with(
    options: WarehouseOptions,
    encryption: Option<EncryptionCodec>,
    cache: bool,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteCatalogStore::new_in_memory().await.unwrap());
    let catalog = if cache {
        Arc::new(CachedCatalog::new(store, CacheConfig::default()))
    } else {
        Arc::new(CachedCatalog::without_cache(store))
    };
    let fs = LocalFileSystem::new_with_prefix(dir.path()).unwrap();
    let storage = Arc::new(PartitionStore::new(Arc::new(fs)));
    let gateway = StreamGateway::new(InMemoryBus::new());

    let warehouse = Arc::new(LakeWarehouse::new(
        catalog, storage, gateway, encryption, options,
    ));
    Fixture {
        _dir: dir,
        warehouse,
    }
}

fn events_schema() -> DataSchema {
    let mut fields = BTreeMap::new();
    fields.insert("user_id".to_string(), FieldType::String);
    fields.insert("event_type".to_string(), FieldType::String);
    fields.insert("amount".to_string(), FieldType::Float);
    let mut schema = DataSchema::new("events", fields);
    schema.primary_key = vec!["user_id".to_string()];
    schema.partition_keys = vec!["event_type".to_string()];
    schema.validation_rules = vec![ValidationRule::NotNull {
        field: "user_id".to_string(),
    }];
    schema
}

fn config(schema: DataSchema) -> IngestionConfig {
    IngestionConfig::new("events", schema)
}

fn query_spec(layer: LakeLayer, filters: Value) -> QuerySpec {
    QuerySpec {
        schema_name: None,
        layer,
        filters: serde_json::from_value(filters).unwrap(),
        aggregations: None,
        limit: 1000,
    }
}

// ============================================================
// Ingest + query
// ============================================================

// The spec's end-to-end scenario: one clean record in, one record out.
#[tokio::test]
async fn test_end_to_end_ingest_and_query() {
    let f = fixture().await;
    let cfg = config(events_schema());
    f.warehouse
        .catalog()
        .register_schema(&cfg.schema)
        .await
        .unwrap();

    let rows = vec![row(&[
        ("user_id", json!("u1")),
        ("event_type", json!("view")),
        ("amount", json!(9.5)),
    ])];
    let partition_id = f
        .warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();
    assert!(partition_id.is_some());

    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({"event_type": "view"})))
        .await
        .unwrap();
    assert_eq!(result.record_count, 1);
    assert_eq!(result.partitions_scanned, 1);
    assert_eq!(result.data.rows()[0]["user_id"], json!("u1"));
    assert_eq!(result.data.rows()[0]["amount"], json!(9.5));
}

// The spec's rejection scenario: nothing persisted on validation failure.
#[tokio::test]
async fn test_rejected_batch_persists_nothing() {
    let f = fixture().await;
    let cfg = config(events_schema());

    let rows = vec![row(&[("event_type", json!("view"))])]; // user_id missing
    let result = f.warehouse.ingest_batch(BatchInput::Rows(rows), &cfg).await;
    assert!(matches!(
        result,
        Err(lakehouse_server::WarehouseError::SchemaValidation { .. })
    ));

    let partitions = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
        .await
        .unwrap();
    assert!(partitions.is_empty());

    // Storage holds no unregistered payload either
    assert!(f.warehouse.storage().list(None).await.unwrap().is_empty());
}

// An empty batch is a no-op, not an error.
#[tokio::test]
async fn test_empty_batch_is_noop() {
    let f = fixture().await;
    let cfg = config(events_schema());
    let result = f
        .warehouse
        .ingest_batch(BatchInput::Rows(vec![]), &cfg)
        .await
        .unwrap();
    assert!(result.is_none());
}

// With quality checks disabled an invalid batch still lands, standardized.
#[tokio::test]
async fn test_quality_checks_disabled_proceeds() {
    let f = fixture().await;
    let mut cfg = config(events_schema());
    cfg.enable_quality_checks = false;

    let rows = vec![row(&[("event_type", json!("view"))])]; // user_id missing
    let partition_id = f
        .warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();
    assert!(partition_id.is_some());

    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({})))
        .await
        .unwrap();
    // standardize filled the missing field with its zero value
    assert_eq!(result.data.rows()[0]["user_id"], json!(""));
}

// A file path plus a declared format is a valid ingestion input.
#[tokio::test]
async fn test_ingest_from_file() {
    let f = fixture().await;
    let cfg = config(events_schema());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");
    std::fs::write(
        &path,
        r#"[{"user_id":"u1","event_type":"view","amount":4.0}]"#,
    )
    .unwrap();

    let partition_id = f
        .warehouse
        .ingest_batch(BatchInput::File(path), &cfg)
        .await
        .unwrap();
    assert!(partition_id.is_some());

    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({})))
        .await
        .unwrap();
    assert_eq!(result.record_count, 1);
    assert_eq!(result.data.rows()[0]["amount"], json!(4.0));
}

// Deduplication happens before storage when enabled.
#[tokio::test]
async fn test_ingest_deduplicates() {
    let f = fixture().await;
    let cfg = config(events_schema());

    let duplicate = row(&[
        ("user_id", json!("u1")),
        ("event_type", json!("view")),
        ("amount", json!(1.0)),
    ]);
    let rows = vec![
        duplicate.clone(),
        row(&[
            ("user_id", json!("u2")),
            ("event_type", json!("view")),
            ("amount", json!(2.0)),
        ]),
        duplicate,
    ];
    f.warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();

    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({})))
        .await
        .unwrap();
    assert_eq!(result.record_count, 2);
}

// Partition pruning: explicit partition_ filters select by key values.
#[tokio::test]
async fn test_partition_pruning() {
    let f = fixture().await;
    let cfg = config(events_schema());

    for (user, event) in [("u1", "click"), ("u2", "view")] {
        let rows = vec![row(&[
            ("user_id", json!(user)),
            ("event_type", json!(event)),
            ("amount", json!(1.0)),
        ])];
        f.warehouse
            .ingest_batch(BatchInput::Rows(rows), &cfg)
            .await
            .unwrap();
    }

    // Metadata-level pruning via the catalog
    let mut filters = BTreeMap::new();
    filters.insert("event_type".to_string(), "click".to_string());
    let pruned = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &filters)
        .await
        .unwrap();
    assert_eq!(pruned.len(), 1);
    assert_eq!(
        pruned[0].partition_values.get("event_type").map(String::as_str),
        Some("click")
    );

    // Query-level: partition_ prefix prunes, result contains only clicks
    let result = f
        .warehouse
        .query(query_spec(
            LakeLayer::Raw,
            json!({"partition_event_type": "click"}),
        ))
        .await
        .unwrap();
    assert_eq!(result.partitions_scanned, 1);
    assert_eq!(result.data.rows()[0]["user_id"], json!("u1"));
}

// The query fan-in is bounded regardless of how many partitions match.
#[tokio::test]
async fn test_query_fan_in_bounded() {
    let f = fixture().await;
    let cfg = config(events_schema());

    for i in 0..12 {
        let rows = vec![row(&[
            ("user_id", json!(format!("u{}", i))),
            ("event_type", json!("view")),
            ("amount", json!(i as f64)),
        ])];
        f.warehouse
            .ingest_batch(BatchInput::Rows(rows), &cfg)
            .await
            .unwrap();
    }

    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({})))
        .await
        .unwrap();
    assert_eq!(result.partitions_scanned, 10);
    assert_eq!(result.record_count, 10);
}

// Aggregations run over the merged result set.
#[tokio::test]
async fn test_query_with_aggregation() {
    let f = fixture().await;
    let cfg = config(events_schema());

    let rows = vec![
        row(&[("user_id", json!("u1")), ("event_type", json!("view")), ("amount", json!(10.0))]),
        row(&[("user_id", json!("u2")), ("event_type", json!("view")), ("amount", json!(30.0))]),
        row(&[("user_id", json!("u3")), ("event_type", json!("click")), ("amount", json!(5.0))]),
    ];
    f.warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();

    let mut spec = query_spec(LakeLayer::Raw, json!({}));
    spec.aggregations = Some(serde_json::from_value(json!({
        "group_by": ["event_type"],
        "functions": {"amount": "sum"}
    })).unwrap());

    let result = f.warehouse.query(spec).await.unwrap();
    assert_eq!(result.record_count, 2);
    let view = result
        .data
        .rows()
        .iter()
        .find(|r| r["event_type"] == json!("view"))
        .unwrap();
    assert_eq!(view["amount_sum"], json!(40.0));
}

// ============================================================
// Encryption
// ============================================================

// PII columns are encrypted at rest and never stored in the clear.
#[tokio::test]
async fn test_pii_encrypted_at_rest() {
    let codec = EncryptionCodec::new(&[3u8; 32]).unwrap();
    let f = fixture_with(WarehouseOptions::default(), Some(codec.clone()), true).await;

    let mut schema = events_schema();
    schema.encryption_required = true;
    schema.pii_fields = vec!["user_id".to_string()];
    let cfg = config(schema);

    let rows = vec![row(&[
        ("user_id", json!("alice@example.com")),
        ("event_type", json!("view")),
        ("amount", json!(1.0)),
    ])];
    f.warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();

    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({})))
        .await
        .unwrap();
    let stored = result.data.rows()[0]["user_id"].as_str().unwrap();
    assert!(EncryptionCodec::is_encrypted(stored));
    assert_eq!(codec.decrypt_value(stored).unwrap(), "alice@example.com");
}

// A schema demanding encryption without a configured key fails ingestion.
#[tokio::test]
async fn test_encryption_required_without_key_fails() {
    let f = fixture().await; // no codec configured

    let mut schema = events_schema();
    schema.encryption_required = true;
    schema.pii_fields = vec!["user_id".to_string()];
    let cfg = config(schema);

    let rows = vec![row(&[
        ("user_id", json!("alice@example.com")),
        ("event_type", json!("view")),
        ("amount", json!(1.0)),
    ])];
    assert!(f
        .warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .is_err());
}

// ============================================================
// Compaction
// ============================================================

// Small partitions merge into one; originals are gone, data is complete.
#[tokio::test]
async fn test_compaction_merges_small_partitions() {
    let f = fixture().await;
    let cfg = config(events_schema());
    f.warehouse
        .catalog()
        .register_schema(&cfg.schema)
        .await
        .unwrap();

    for user in ["u1", "u2", "u3"] {
        let rows = vec![row(&[
            ("user_id", json!(user)),
            ("event_type", json!("view")),
            ("amount", json!(1.0)),
        ])];
        f.warehouse
            .ingest_batch(BatchInput::Rows(rows), &cfg)
            .await
            .unwrap();
    }

    let report = f.warehouse.optimize_storage().await.unwrap();
    assert_eq!(report.compacted_groups, 1);
    assert_eq!(report.partitions_compacted, 3);

    let partitions = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].record_count, 3);

    // All rows survive the merge
    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({})))
        .await
        .unwrap();
    assert_eq!(result.record_count, 3);

    // Lineage names all three sources
    let lineage = f
        .warehouse
        .catalog()
        .get_lineage(&partitions[0].partition_id)
        .await
        .unwrap();
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].transformation, "compaction");
    assert_eq!(lineage[0].source_partition_ids.len(), 3);
}

// The spec's crash-safety property: with the merged partition written and
// registered but the originals not yet removed, nothing is lost - and the
// next optimize run converges.
#[tokio::test]
async fn test_compaction_crash_leaves_no_loss() {
    let f = fixture().await;
    let cfg = config(events_schema());
    f.warehouse
        .catalog()
        .register_schema(&cfg.schema)
        .await
        .unwrap();

    for user in ["u1", "u2"] {
        let rows = vec![row(&[
            ("user_id", json!(user)),
            ("event_type", json!("view")),
            ("amount", json!(1.0)),
        ])];
        f.warehouse
            .ingest_batch(BatchInput::Rows(rows), &cfg)
            .await
            .unwrap();
    }

    // Reproduce the state right before a mid-compaction crash: merged
    // partition written AND registered, originals still present.
    let originals = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(originals.len(), 2);

    let merged_rows = vec![
        row(&[("user_id", json!("u1")), ("event_type", json!("view")), ("amount", json!(1.0))]),
        row(&[("user_id", json!("u2")), ("event_type", json!("view")), ("amount", json!(1.0))]),
    ];
    let merged = lakehouse_core::Batch::from_rows(merged_rows);
    let encoded = serde_json::to_vec(merged.rows()).unwrap();
    let checksum = checksum_bytes(&encoded);
    let created_at = chrono::Utc::now().timestamp_millis();
    let merged_id = derive_partition_id(
        "events",
        LakeLayer::Raw,
        &BTreeMap::new(),
        created_at,
        &checksum,
    );
    let path = storage_key(LakeLayer::Raw, "events", &merged_id);
    let size = f
        .warehouse
        .storage()
        .write_bytes(&encoded, &path, Compression::Lz4)
        .await
        .unwrap();
    f.warehouse
        .catalog()
        .register_partition(&DataPartition {
            partition_id: merged_id.clone(),
            layer: LakeLayer::Raw,
            schema_name: "events".to_string(),
            partition_values: BTreeMap::new(),
            storage_path: path,
            format: DataFormat::Json,
            compression: Compression::Lz4,
            record_count: 2,
            size_bytes: size,
            created_at,
            last_modified_at: created_at,
            checksum,
        })
        .await
        .unwrap();

    // "Crash": originals never removed. Both old and new are visible, so
    // data is duplicated but never lost.
    let after_crash = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(after_crash.len(), 3);

    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({})))
        .await
        .unwrap();
    let users: std::collections::HashSet<String> = result
        .data
        .rows()
        .iter()
        .map(|r| r["user_id"].as_str().unwrap().to_string())
        .collect();
    assert!(users.contains("u1") && users.contains("u2"));

    // Recovery: the next maintenance run compacts everything down again.
    f.warehouse.optimize_storage().await.unwrap();
    let recovered = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(recovered.len(), 1);
}

// ============================================================
// Archival, retention, orphans
// ============================================================

// Short retention: partitions age out to archive, then cleanup removes
// them one retention period after archival.
#[tokio::test]
async fn test_archival_and_retention() {
    let f = fixture().await;
    let mut schema = events_schema();
    schema.retention_secs = Some(1);
    let cfg = config(schema.clone());
    f.warehouse.catalog().register_schema(&schema).await.unwrap();

    let rows = vec![row(&[
        ("user_id", json!("u1")),
        ("event_type", json!("view")),
        ("amount", json!(1.0)),
    ])];
    f.warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();
    let original = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
        .await
        .unwrap()
        .remove(0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let report = f.warehouse.optimize_storage().await.unwrap();
    assert_eq!(report.partitions_archived, 1);
    // Freshly archived data is not removed within the same run
    assert_eq!(report.retention_removed, 0);

    let raw = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
        .await
        .unwrap();
    assert!(raw.is_empty());

    let archived = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Archive, &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(archived.len(), 1);
    // True age is preserved on the archive copy
    assert_eq!(archived[0].created_at, original.created_at);

    // One retention period after archival, cleanup removes it.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let report = f.warehouse.optimize_storage().await.unwrap();
    assert_eq!(report.retention_removed, 1);
    let archived = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Archive, &BTreeMap::new())
        .await
        .unwrap();
    assert!(archived.is_empty());
}

// Unregistered storage files older than the grace period are reconciled.
#[tokio::test]
async fn test_orphan_sweep() {
    let options = WarehouseOptions {
        orphan_grace: Duration::ZERO,
        ..WarehouseOptions::default()
    };
    let f = fixture_with(options, None, true).await;
    let cfg = config(events_schema());

    // One real partition and one stray file nothing registered
    let rows = vec![row(&[
        ("user_id", json!("u1")),
        ("event_type", json!("view")),
        ("amount", json!(1.0)),
    ])];
    f.warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();
    f.warehouse
        .storage()
        .write_bytes(b"[]", "raw/events/stray-file", Compression::None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let report = f.warehouse.optimize_storage().await.unwrap();
    assert_eq!(report.orphans_removed, 1);

    // The registered partition is untouched
    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Raw, json!({})))
        .await
        .unwrap();
    assert_eq!(result.record_count, 1);
}

// ============================================================
// Promotion
// ============================================================

// Raw -> Cleaned applies null handling + dedup and records lineage.
#[tokio::test]
async fn test_promotion_to_cleaned() {
    let f = fixture().await;
    let mut cfg = config(events_schema());
    cfg.enable_deduplication = false; // keep the duplicate for promotion to clean up

    let duplicate = row(&[
        ("user_id", json!("u1")),
        ("event_type", json!("view")),
        ("amount", json!(2.0)),
    ]);
    let rows = vec![
        duplicate.clone(),
        duplicate,
        row(&[
            ("user_id", json!("u2")),
            ("event_type", json!("view")),
            ("amount", Value::Null),
        ]),
    ];
    f.warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();

    let promoted = f
        .warehouse
        .promote_partitions("events", LakeLayer::Raw)
        .await
        .unwrap();
    assert_eq!(promoted.len(), 1);

    let result = f
        .warehouse
        .query(query_spec(LakeLayer::Cleaned, json!({})))
        .await
        .unwrap();
    // Duplicate dropped, null median-filled
    assert_eq!(result.record_count, 2);
    assert!(result.data.rows().iter().all(|r| !r["amount"].is_null()));

    let lineage = f
        .warehouse
        .catalog()
        .get_lineage(&promoted[0])
        .await
        .unwrap();
    assert_eq!(lineage[0].transformation, "promote_to_cleaned");

    // Source layer retained
    let raw = f
        .warehouse
        .catalog()
        .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(raw.len(), 1);
}

// Promotion from the last pipeline stage is rejected.
#[tokio::test]
async fn test_promotion_from_curated_fails() {
    let f = fixture().await;
    let result = f
        .warehouse
        .promote_partitions("events", LakeLayer::Curated)
        .await;
    assert!(matches!(
        result,
        Err(lakehouse_server::WarehouseError::InvalidPromotion(_))
    ));
}

// ============================================================
// Streaming
// ============================================================

// Stream messages become raw partitions through the registered handler.
#[tokio::test]
async fn test_streaming_ingestion() {
    let f = fixture().await;
    let cfg = config(events_schema());

    let handles = f
        .warehouse
        .start_streaming(vec![("booking-events".to_string(), cfg)])
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    f.warehouse
        .gateway()
        .publish(
            "booking-events",
            Some("u1".to_string()),
            json!({"user_id": "u1", "event_type": "created", "amount": 3.0}),
        )
        .await
        .unwrap();

    let mut found = Vec::new();
    for _ in 0..200 {
        found = f
            .warehouse
            .catalog()
            .find_partitions(None, LakeLayer::Raw, &BTreeMap::new())
            .await
            .unwrap();
        if !found.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].record_count, 1);

    for handle in handles {
        handle.abort();
    }
}

// ============================================================
// Health
// ============================================================

#[tokio::test]
async fn test_health_healthy_and_degraded() {
    let f = fixture().await;
    let report = f.warehouse.health().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.cache_enabled);

    // Without a cache the store still answers: degraded, not unhealthy.
    let f = fixture_with(WarehouseOptions::default(), None, false).await;
    let cfg = config(events_schema());
    let rows = vec![row(&[
        ("user_id", json!("u1")),
        ("event_type", json!("view")),
        ("amount", json!(1.0)),
    ])];
    f.warehouse
        .ingest_batch(BatchInput::Rows(rows), &cfg)
        .await
        .unwrap();

    let report = f.warehouse.health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(!report.cache_enabled);
    assert_eq!(report.total_records, 1);
    assert!(report.total_bytes > 0);
}
