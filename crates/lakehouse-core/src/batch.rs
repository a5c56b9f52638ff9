//! In-Memory Batch Representation
//!
//! A [`Batch`] is the tabular unit every validator and transformer operates
//! on: an ordered list of rows, each row a JSON object. Upstream producers
//! (REST pollers, change-event streams, file loads) all materialize into
//! this one shape before entering the pipeline.
//!
//! ## Design Decisions
//!
//! - Rows are `serde_json::Map<String, Value>` - key-sorted maps, so the
//!   canonical serialization of a batch is deterministic and its checksum is
//!   stable across re-serialization.
//! - Row order is preserved end to end; transformations that drop rows
//!   (deduplicate) keep first-occurrence order.
//! - Column set is the union of row keys. Missing cells read as null; the
//!   `standardize` transformation is what makes batches rectangular.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// A single row: column name -> value, key-sorted.
pub type Row = serde_json::Map<String, Value>;

/// An ordered collection of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    rows: Vec<Row>,
}

impl Batch {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// A batch holding a single record.
    pub fn from_record(row: Row) -> Self {
        Self { rows: vec![row] }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Union of all column names across rows, sorted.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = BTreeSet::new();
        for row in &self.rows {
            for key in row.keys() {
                cols.insert(key.clone());
            }
        }
        cols.into_iter().collect()
    }

    /// Values of one column, in row order. Missing cells read as null.
    pub fn column_values(&self, column: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Concatenate batches in order. Used by the query path and compaction.
    pub fn concat(batches: Vec<Batch>) -> Batch {
        let mut rows = Vec::with_capacity(batches.iter().map(Batch::len).sum());
        for batch in batches {
            rows.extend(batch.rows);
        }
        Batch { rows }
    }

    /// Keep only the first `limit` rows.
    pub fn truncate(&mut self, limit: usize) {
        self.rows.truncate(limit);
    }

    /// Deterministic serialized form. Row maps are key-sorted, so two
    /// batches with equal content always produce identical bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Serializing Vec<Map> cannot fail: values are already JSON.
        serde_json::to_vec(&self.rows).unwrap_or_default()
    }

    /// Hex SHA-256 of the canonical serialization.
    pub fn checksum(&self) -> String {
        checksum_bytes(&self.canonical_bytes())
    }

    /// Approximate in-memory size, used for partition sizing decisions.
    pub fn estimated_size(&self) -> usize {
        self.canonical_bytes().len()
    }
}

/// Hex SHA-256 digest of arbitrary bytes. Partition checksums hash the
/// encoded (pre-compression) payload, so read-path verification catches
/// silent corruption of the stored bytes.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Build a row from key/value pairs. Test and example helper.
pub fn row(pairs: &[(&str, Value)]) -> Row {
    let mut map = Row::new();
    for (key, value) in pairs {
        map.insert((*key).to_string(), value.clone());
    }
    map
}
