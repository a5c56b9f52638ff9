//! Partition Metadata
//!
//! A partition is the atomic unit of stored data: one immutable payload in
//! the storage backend plus one metadata row in the catalog. Think of it as
//! the lakehouse analogue of a log segment - written once, never modified,
//! eventually compacted or archived away.
//!
//! ## Layers
//!
//! Every partition lives in exactly one layer of the pipeline:
//!
//! | Layer   | Meaning                                     |
//! |---------|---------------------------------------------|
//! | raw     | As ingested, post-standardize               |
//! | cleaned | Nulls handled, duplicates removed           |
//! | curated | Outlier-annotated, business-ready           |
//! | archive | Past its useful life, awaiting retention    |
//!
//! The pipeline is ordered: raw -> cleaned -> curated. Archive is reachable
//! from any layer once retention expires. Backwards transitions are invalid.
//!
//! ## Identity
//!
//! Partition IDs are derived, not random:
//!
//! ```text
//! {source}-{layer}-{key=value...}-{epoch_seconds}-{checksum_prefix}
//! ```
//!
//! The checksum component makes IDs collision-free for distinct batches
//! ingested within the same second, while a byte-identical retry of the same
//! batch deterministically maps to the same ID and lands on the catalog's
//! idempotent upsert path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::Compression;
use crate::error::{Error, Result};
use crate::ingest::DataFormat;

/// Pipeline stage a partition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LakeLayer {
    Raw,
    Cleaned,
    Curated,
    Archive,
}

impl LakeLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            LakeLayer::Raw => "raw",
            LakeLayer::Cleaned => "cleaned",
            LakeLayer::Curated => "curated",
            LakeLayer::Archive => "archive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(LakeLayer::Raw),
            "cleaned" => Some(LakeLayer::Cleaned),
            "curated" => Some(LakeLayer::Curated),
            "archive" => Some(LakeLayer::Archive),
            _ => None,
        }
    }

    /// Next stage in the quality pipeline, if any.
    pub fn next(&self) -> Option<LakeLayer> {
        match self {
            LakeLayer::Raw => Some(LakeLayer::Cleaned),
            LakeLayer::Cleaned => Some(LakeLayer::Curated),
            LakeLayer::Curated | LakeLayer::Archive => None,
        }
    }

    /// Whether a partition may move from `self` to `to`. Forward one step in
    /// the pipeline, or into archive from anywhere.
    pub fn can_transition_to(&self, to: LakeLayer) -> bool {
        to == LakeLayer::Archive || self.next() == Some(to)
    }

    pub const ALL: [LakeLayer; 4] = [
        LakeLayer::Raw,
        LakeLayer::Cleaned,
        LakeLayer::Curated,
        LakeLayer::Archive,
    ];
}

impl std::fmt::Display for LakeLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one stored partition.
///
/// Owned by the catalog once registered; the storage backend owns only the
/// bytes at `storage_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPartition {
    /// Unique derived identifier (see module docs)
    pub partition_id: String,

    /// Pipeline layer
    pub layer: LakeLayer,

    /// Schema this partition was written under
    pub schema_name: String,

    /// Partition-key field -> value, as strings
    pub partition_values: BTreeMap<String, String>,

    /// Key of the payload in the storage backend
    pub storage_path: String,

    /// Serialization format of the stored payload
    pub format: DataFormat,

    /// Compression applied to the stored payload
    pub compression: Compression,

    /// Number of rows in the payload
    pub record_count: u64,

    /// Stored (compressed) payload size in bytes
    pub size_bytes: u64,

    /// Creation timestamp (milliseconds since Unix epoch)
    pub created_at: i64,

    /// Last metadata update (milliseconds since Unix epoch)
    pub last_modified_at: i64,

    /// Hex SHA-256 of the canonical batch serialization
    pub checksum: String,
}

impl DataPartition {
    /// Whether this partition's key values satisfy every `filters` entry.
    /// Used for partition pruning before any payload is loaded.
    pub fn matches_partition_filters(&self, filters: &BTreeMap<String, String>) -> bool {
        filters
            .iter()
            .all(|(key, expected)| self.partition_values.get(key).map(String::as_str) == Some(expected))
    }

    /// Whether this partition *may* contain rows matching `filters`: a
    /// recorded key with a different value rules it out; a key the partition
    /// never recorded is inconclusive and keeps it in. Used to prune with
    /// row-level equality filters without risking false negatives.
    pub fn could_contain(&self, filters: &BTreeMap<String, String>) -> bool {
        filters.iter().all(|(key, expected)| {
            match self.partition_values.get(key) {
                Some(actual) => actual == expected,
                None => true,
            }
        })
    }

    /// Validate a layer move for this partition.
    pub fn check_transition(&self, to: LakeLayer) -> Result<()> {
        if self.layer.can_transition_to(to) {
            Ok(())
        } else {
            Err(Error::InvalidLayerTransition {
                from: self.layer.to_string(),
                to: to.to_string(),
            })
        }
    }
}

/// Derive a deterministic partition ID.
///
/// `checksum` is the batch content hash; its first 8 hex chars disambiguate
/// distinct batches ingested within the same second.
pub fn derive_partition_id(
    source: &str,
    layer: LakeLayer,
    partition_values: &BTreeMap<String, String>,
    created_at_ms: i64,
    checksum: &str,
) -> String {
    let mut parts = vec![sanitize(source), layer.as_str().to_string()];
    for (key, value) in partition_values {
        parts.push(format!("{}={}", sanitize(key), sanitize(value)));
    }
    parts.push((created_at_ms / 1000).to_string());
    parts.push(checksum.chars().take(8).collect());
    parts.join("-")
}

/// Storage key for a partition payload: `{layer}/{schema}/{partition_id}`.
pub fn storage_key(layer: LakeLayer, schema_name: &str, partition_id: &str) -> String {
    format!("{}/{}/{}", layer.as_str(), sanitize(schema_name), partition_id)
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_layer_pipeline_order() {
        assert_eq!(LakeLayer::Raw.next(), Some(LakeLayer::Cleaned));
        assert_eq!(LakeLayer::Cleaned.next(), Some(LakeLayer::Curated));
        assert_eq!(LakeLayer::Curated.next(), None);
    }

    #[test]
    fn test_archive_reachable_from_any_layer() {
        for layer in LakeLayer::ALL {
            if layer != LakeLayer::Archive {
                assert!(layer.can_transition_to(LakeLayer::Archive));
            }
        }
    }

    #[test]
    fn test_backwards_transition_invalid() {
        assert!(!LakeLayer::Curated.can_transition_to(LakeLayer::Raw));
        assert!(!LakeLayer::Cleaned.can_transition_to(LakeLayer::Raw));
        assert!(!LakeLayer::Raw.can_transition_to(LakeLayer::Curated)); // no skipping
    }

    #[test]
    fn test_partition_id_is_deterministic() {
        let values = keys(&[("event_type", "click")]);
        let a = derive_partition_id("events", LakeLayer::Raw, &values, 1_700_000_000_123, "abcdef0123456789");
        let b = derive_partition_id("events", LakeLayer::Raw, &values, 1_700_000_000_999, "abcdef0123456789");
        // Same second, same content -> same ID
        assert_eq!(a, b);
        assert_eq!(a, "events-raw-event_type=click-1700000000-abcdef01");
    }

    #[test]
    fn test_distinct_content_same_second_distinct_ids() {
        let values = keys(&[("event_type", "click")]);
        let a = derive_partition_id("events", LakeLayer::Raw, &values, 1_700_000_000_123, "aaaa000011112222");
        let b = derive_partition_id("events", LakeLayer::Raw, &values, 1_700_000_000_123, "bbbb000011112222");
        assert_ne!(a, b);
    }

    #[test]
    fn test_partition_filter_match() {
        let partition = DataPartition {
            partition_id: "p1".to_string(),
            layer: LakeLayer::Raw,
            schema_name: "events".to_string(),
            partition_values: keys(&[("event_type", "click"), ("region", "eu")]),
            storage_path: "raw/events/p1".to_string(),
            format: DataFormat::Json,
            compression: Compression::Lz4,
            record_count: 10,
            size_bytes: 100,
            created_at: 0,
            last_modified_at: 0,
            checksum: String::new(),
        };
        assert!(partition.matches_partition_filters(&keys(&[("event_type", "click")])));
        assert!(!partition.matches_partition_filters(&keys(&[("event_type", "view")])));
        assert!(!partition.matches_partition_filters(&keys(&[("missing", "x")])));
    }
}
