//! Query Specification and Row Filtering
//!
//! A [`QuerySpec`] names a layer (and optionally a schema), a set of
//! filters, optional aggregations and a row limit.
//!
//! ## Filter Semantics
//!
//! Filters are a map of field -> condition, combined with AND:
//!
//! - A scalar condition means equality: `{"event_type": "click"}`
//! - An object condition applies operators:
//!   `{"amount": {"gte": 10, "lt": 100}}`
//! - Supported operators: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`, `in`,
//!   `contains`. Unknown operator keys are ignored, not errors.
//! - Keys prefixed `partition_` address partition-key values and prune at
//!   the metadata level before any payload is loaded
//!   (`partition_event_type` matches the `event_type` partition key).
//!
//! Scalar equality filters additionally prune partitions whose recorded
//! key value rules them out - pruning is an optimization and never changes
//! results, because row-level filters are re-applied after loading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lakehouse_core::batch::{Batch, Row};
use lakehouse_core::LakeLayer;
use lakehouse_transform::AggregateSpec;

/// Prefix marking a filter as a partition-key predicate.
pub const PARTITION_FILTER_PREFIX: &str = "partition_";

fn default_limit() -> usize {
    1000
}

/// What to query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub schema_name: Option<String>,
    pub layer: LakeLayer,
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub aggregations: Option<AggregateSpec>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Query output plus the cost metadata callers need for pagination.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub data: Batch,
    pub record_count: usize,
    pub partitions_scanned: usize,
    pub elapsed_ms: u64,
}

/// Stringify a scalar the way partition-key values are recorded.
fn filter_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Partition-key predicates: explicit `partition_`-prefixed filters.
pub fn partition_predicates(filters: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    filters
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(PARTITION_FILTER_PREFIX)
                .map(|stripped| (stripped.to_string(), filter_string(value)))
        })
        .collect()
}

/// Scalar equality filters usable for best-effort pruning via
/// `DataPartition::could_contain`.
pub fn equality_predicates(filters: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    filters
        .iter()
        .filter(|(key, _)| !key.starts_with(PARTITION_FILTER_PREFIX))
        .filter(|(_, value)| !value.is_object() && !value.is_array())
        .map(|(key, value)| (key.clone(), filter_string(value)))
        .collect()
}

/// Row-level filters: everything that is not a partition predicate.
pub fn row_filters(filters: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    filters
        .iter()
        .filter(|(key, _)| !key.starts_with(PARTITION_FILTER_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Apply row-level filters, preserving row order.
pub fn apply_row_filters(batch: Batch, filters: &BTreeMap<String, Value>) -> Batch {
    if filters.is_empty() {
        return batch;
    }
    let rows = batch
        .into_rows()
        .into_iter()
        .filter(|row| row_matches(row, filters))
        .collect();
    Batch::from_rows(rows)
}

fn row_matches(row: &Row, filters: &BTreeMap<String, Value>) -> bool {
    filters.iter().all(|(field, condition)| {
        let cell = row.get(field).cloned().unwrap_or(Value::Null);
        match condition {
            Value::Object(ops) => ops.iter().all(|(op, operand)| {
                match op.as_str() {
                    "eq" => &cell == operand,
                    "ne" => &cell != operand,
                    "gt" => compare_numeric(&cell, operand, |a, b| a > b),
                    "gte" => compare_numeric(&cell, operand, |a, b| a >= b),
                    "lt" => compare_numeric(&cell, operand, |a, b| a < b),
                    "lte" => compare_numeric(&cell, operand, |a, b| a <= b),
                    "in" => operand
                        .as_array()
                        .map(|candidates| candidates.contains(&cell))
                        .unwrap_or(false),
                    "contains" => contains(&cell, operand),
                    // Unknown operators are ignored, not errors.
                    _ => true,
                }
            }),
            scalar => &cell == scalar,
        }
    })
}

fn compare_numeric(cell: &Value, operand: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (cell.as_f64(), operand.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn contains(cell: &Value, operand: &Value) -> bool {
    match cell {
        Value::String(s) => operand.as_str().map(|needle| s.contains(needle)).unwrap_or(false),
        Value::Array(items) => items.contains(operand),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakehouse_core::batch::row;
    use serde_json::json;

    fn events() -> Batch {
        Batch::from_rows(vec![
            row(&[("event_type", json!("view")), ("amount", json!(5))]),
            row(&[("event_type", json!("click")), ("amount", json!(15))]),
            row(&[("event_type", json!("click")), ("amount", json!(50))]),
        ])
    }

    fn filters(json: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(json).unwrap()
    }

    // Test 1: scalar filter means equality
    #[test]
    fn test_scalar_equality() {
        let out = apply_row_filters(events(), &filters(json!({"event_type": "click"})));
        assert_eq!(out.len(), 2);
    }

    // Test 2: comparison operators on numbers
    #[test]
    fn test_comparisons() {
        let out = apply_row_filters(events(), &filters(json!({"amount": {"gte": 15, "lt": 50}})));
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0]["amount"], json!(15));
    }

    // Test 3: `in` and `contains`
    #[test]
    fn test_in_and_contains() {
        let out = apply_row_filters(events(), &filters(json!({"event_type": {"in": ["view", "scroll"]}})));
        assert_eq!(out.len(), 1);

        let out = apply_row_filters(events(), &filters(json!({"event_type": {"contains": "lick"}})));
        assert_eq!(out.len(), 2);
    }

    // Test 4: unknown operators are ignored, not errors
    #[test]
    fn test_unknown_operator_ignored() {
        let out = apply_row_filters(events(), &filters(json!({"amount": {"regex": ".*", "gt": 10}})));
        assert_eq!(out.len(), 2);
    }

    // Test 5: ne against missing field compares to null
    #[test]
    fn test_ne_and_missing_fields() {
        let out = apply_row_filters(events(), &filters(json!({"event_type": {"ne": "view"}})));
        assert_eq!(out.len(), 2);

        // Missing field reads as null; equality against a value fails
        let out = apply_row_filters(events(), &filters(json!({"missing": "x"})));
        assert!(out.is_empty());
    }

    // Test 6: partition_ prefix splits out of row filters
    #[test]
    fn test_filter_splitting() {
        let all = filters(json!({
            "partition_event_type": "click",
            "amount": {"gt": 10},
            "event_type": "click"
        }));

        let partition = partition_predicates(&all);
        assert_eq!(partition.get("event_type").map(String::as_str), Some("click"));

        let rows = row_filters(&all);
        assert!(rows.contains_key("amount"));
        assert!(rows.contains_key("event_type"));
        assert!(!rows.contains_key("partition_event_type"));

        let equality = equality_predicates(&all);
        assert_eq!(equality.len(), 1); // only the scalar event_type
    }

    // Test 7: limit-friendly - filters preserve row order
    #[test]
    fn test_order_preserved() {
        let out = apply_row_filters(events(), &filters(json!({"event_type": "click"})));
        assert_eq!(out.rows()[0]["amount"], json!(15));
        assert_eq!(out.rows()[1]["amount"], json!(50));
    }
}
