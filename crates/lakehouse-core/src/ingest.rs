//! Ingestion Configuration
//!
//! [`IngestionConfig`] binds a source to a schema for the duration of an
//! ingestion call. It is transient - never persisted - which keeps the
//! catalog authoritative only for things that actually exist (schemas and
//! partitions), not for how callers happened to configure a run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::batch::Row;
use crate::codec::Compression;
use crate::schema::DataSchema;

/// Kind of system a batch originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Kafka,
    Api,
    File,
    Database,
}

/// Serialization format of a payload on disk / object storage.
///
/// Json, Csv and Parquet are implemented. The remaining variants are
/// declared for wire compatibility with upstream configuration and rejected
/// with an unsupported-format error by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Json,
    Csv,
    Parquet,
    Avro,
    Xml,
    Xlsx,
    Orc,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Csv => "csv",
            DataFormat::Parquet => "parquet",
            DataFormat::Avro => "avro",
            DataFormat::Xml => "xml",
            DataFormat::Xlsx => "xlsx",
            DataFormat::Orc => "orc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(DataFormat::Json),
            "csv" => Some(DataFormat::Csv),
            "parquet" => Some(DataFormat::Parquet),
            "avro" => Some(DataFormat::Avro),
            "xml" => Some(DataFormat::Xml),
            "xlsx" => Some(DataFormat::Xlsx),
            "orc" => Some(DataFormat::Orc),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a source delivers data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Batch,
    Streaming,
    MicroBatch,
    RealTime,
}

/// Per-source ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Source name; becomes the partition ID prefix
    pub source_name: String,

    /// Kind of upstream system
    pub source_type: SourceType,

    /// Payload serialization format
    pub data_format: DataFormat,

    /// Contract the batch is validated against
    pub schema: DataSchema,

    /// Delivery mode
    pub processing_mode: ProcessingMode,

    /// Target rows per batch for chunked sources
    pub batch_size: usize,

    /// Compression applied to stored payloads
    pub compression: Compression,

    /// Drop exact-duplicate rows before storage
    pub enable_deduplication: bool,

    /// Reject batches failing schema validation
    pub enable_quality_checks: bool,
}

impl IngestionConfig {
    /// Sensible defaults for a batch source: LZ4 compression, dedup and
    /// quality gates on.
    pub fn new(source_name: impl Into<String>, schema: DataSchema) -> Self {
        Self {
            source_name: source_name.into(),
            source_type: SourceType::Api,
            data_format: DataFormat::Json,
            schema,
            processing_mode: ProcessingMode::Batch,
            batch_size: 10_000,
            compression: Compression::Lz4,
            enable_deduplication: true,
            enable_quality_checks: true,
        }
    }
}

/// The three shapes a caller can hand to `ingest_batch`.
#[derive(Debug, Clone)]
pub enum BatchInput {
    /// Already-tabular rows
    Rows(Vec<Row>),
    /// A single record
    Record(Row),
    /// A file on disk, decoded per the config's `data_format`
    File(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_format_parse_round_trip() {
        for format in [
            DataFormat::Json,
            DataFormat::Csv,
            DataFormat::Parquet,
            DataFormat::Xlsx,
        ] {
            assert_eq!(DataFormat::parse(format.as_str()), Some(format));
        }
        assert_eq!(DataFormat::parse("protobuf"), None);
    }

    #[test]
    fn test_config_defaults() {
        let schema = DataSchema::new("events", BTreeMap::new());
        let config = IngestionConfig::new("events", schema);
        assert_eq!(config.compression, Compression::Lz4);
        assert!(config.enable_quality_checks);
        assert!(config.enable_deduplication);
        assert_eq!(config.batch_size, 10_000);
    }
}
