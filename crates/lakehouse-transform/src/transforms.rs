//! Named Transformation Registry
//!
//! [`Transformer`] holds a string-keyed table of transformation functions,
//! built once at startup. Callers apply transformations by name, strictly in
//! the order they specify; each transformation is a pure function over an
//! in-memory batch, so any step can be retried in isolation.
//!
//! ## Built-ins
//!
//! | Name              | Effect                                              |
//! |-------------------|-----------------------------------------------------|
//! | `deduplicate`     | Drop exact-duplicate rows, keep first occurrence    |
//! | `handle_nulls`    | Median-fill numeric nulls, empty-string for strings |
//! | `detect_outliers` | Annotate rows with `is_outlier` (never drops)       |
//! | `standardize`     | Align batch to schema: add/coerce/encrypt columns   |
//! | `aggregate`       | Group-by + aggregate functions                      |
//!
//! `handle_nulls` is a lossy, policy-driven default - sources that need a
//! different null policy override it by registering their own function under
//! the same name.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lakehouse_core::batch::Batch;
use lakehouse_core::{DataSchema, EncryptionCodec};

use crate::error::{Result, TransformError};
use crate::outlier::{outlier_flags, IsolationForestConfig};

/// Column annotated by `detect_outliers`.
pub const OUTLIER_COLUMN: &str = "is_outlier";

/// Minimum rows before outlier detection has enough signal to run.
const OUTLIER_MIN_ROWS: usize = 8;

/// Aggregate function applied to one column within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFn {
    Sum,
    Mean,
    Min,
    Max,
    Count,
}

impl AggFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggFn::Sum => "sum",
            AggFn::Mean => "mean",
            AggFn::Min => "min",
            AggFn::Max => "max",
            AggFn::Count => "count",
        }
    }
}

/// Group-by specification for the `aggregate` transformation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Columns to group on
    pub group_by: Vec<String>,
    /// Column -> aggregate function; empty means a per-group row count
    #[serde(default)]
    pub functions: BTreeMap<String, AggFn>,
}

/// Everything a transformation may need beyond the batch itself.
#[derive(Default, Clone, Copy)]
pub struct TransformContext<'a> {
    pub schema: Option<&'a DataSchema>,
    pub encryption: Option<&'a EncryptionCodec>,
    pub aggregate: Option<&'a AggregateSpec>,
}

impl<'a> TransformContext<'a> {
    pub fn empty() -> Self {
        Self::default()
    }
}

type TransformFn = Arc<dyn Fn(Batch, &TransformContext) -> Result<Batch> + Send + Sync>;

/// The registry. Build once, share via reference or clone (cheap - the
/// functions are `Arc`s).
#[derive(Clone)]
pub struct Transformer {
    registry: HashMap<String, TransformFn>,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer {
    /// Registry with all built-ins and default outlier settings.
    pub fn new() -> Self {
        Self::with_outlier_config(IsolationForestConfig::default())
    }

    pub fn with_outlier_config(outlier_config: IsolationForestConfig) -> Self {
        let mut transformer = Self {
            registry: HashMap::new(),
        };
        transformer.register("deduplicate", |batch, _| Ok(deduplicate(batch)));
        transformer.register("handle_nulls", |batch, _| Ok(handle_nulls(batch)));
        transformer.register("standardize", |batch, ctx| standardize(batch, ctx));
        transformer.register("aggregate", |batch, ctx| {
            let spec = ctx.aggregate.ok_or_else(|| TransformError::MissingContext {
                name: "aggregate".to_string(),
                requirement: "an aggregate spec".to_string(),
            })?;
            aggregate(batch, spec)
        });
        transformer.register(
            "detect_outliers",
            move |batch, _| Ok(detect_outliers(batch, &outlier_config)),
        );
        transformer
    }

    /// Register (or override) a transformation under `name`.
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Batch, &TransformContext) -> Result<Batch> + Send + Sync + 'static,
    {
        self.registry.insert(name.to_string(), Arc::new(f));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply one transformation by name.
    pub fn apply(&self, name: &str, batch: Batch, ctx: &TransformContext) -> Result<Batch> {
        let f = self
            .registry
            .get(name)
            .ok_or_else(|| TransformError::UnknownTransformation(name.to_string()))?;
        f(batch, ctx)
    }

    /// Apply transformations strictly in the given order.
    pub fn apply_all(&self, names: &[&str], mut batch: Batch, ctx: &TransformContext) -> Result<Batch> {
        for name in names {
            batch = self.apply(name, batch, ctx)?;
        }
        Ok(batch)
    }

    // Convenience wrappers for the common paths.

    pub fn deduplicate(&self, batch: Batch) -> Result<Batch> {
        self.apply("deduplicate", batch, &TransformContext::empty())
    }

    pub fn standardize(
        &self,
        batch: Batch,
        schema: &DataSchema,
        encryption: Option<&EncryptionCodec>,
    ) -> Result<Batch> {
        let ctx = TransformContext {
            schema: Some(schema),
            encryption,
            aggregate: None,
        };
        self.apply("standardize", batch, &ctx)
    }

    pub fn aggregate(&self, batch: Batch, spec: &AggregateSpec) -> Result<Batch> {
        let ctx = TransformContext {
            schema: None,
            encryption: None,
            aggregate: Some(spec),
        };
        self.apply("aggregate", batch, &ctx)
    }
}

// ============================================================
// Built-in implementations
// ============================================================

/// Drop exact-duplicate rows, preserving first-occurrence order.
fn deduplicate(batch: Batch) -> Batch {
    let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(batch.len());
    let rows = batch
        .into_rows()
        .into_iter()
        .filter(|row| {
            let key = serde_json::to_vec(row).unwrap_or_default();
            seen.insert(key)
        })
        .collect();
    Batch::from_rows(rows)
}

/// Fill nulls: numeric columns get the column median, string columns the
/// empty string. Columns of any other shape are left alone.
fn handle_nulls(mut batch: Batch) -> Batch {
    let columns = batch.columns();
    for column in columns {
        let values = batch.column_values(&column);
        let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
        if non_null.is_empty() || non_null.len() == values.len() {
            continue;
        }

        let fill = if non_null.iter().all(|v| v.is_number()) {
            let mut numbers: Vec<f64> = non_null.iter().filter_map(|v| v.as_f64()).collect();
            numbers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let median = if numbers.len() % 2 == 1 {
                numbers[numbers.len() / 2]
            } else {
                (numbers[numbers.len() / 2 - 1] + numbers[numbers.len() / 2]) / 2.0
            };
            if non_null.iter().all(|v| v.is_i64()) && median.fract() == 0.0 {
                Value::from(median as i64)
            } else {
                Value::from(median)
            }
        } else if non_null.iter().all(|v| v.is_string()) {
            Value::String(String::new())
        } else {
            continue;
        };

        for row in batch.rows_mut() {
            let needs_fill = matches!(row.get(&column), None | Some(Value::Null));
            if needs_fill {
                row.insert(column.clone(), fill.clone());
            }
        }
    }
    batch
}

/// Annotate each row with `is_outlier` from an isolation forest over the
/// numeric columns. Rows are never dropped - removal is a downstream call.
fn detect_outliers(mut batch: Batch, config: &IsolationForestConfig) -> Batch {
    let numeric_columns: Vec<String> = batch
        .columns()
        .into_iter()
        .filter(|col| col != OUTLIER_COLUMN)
        .filter(|col| {
            let values = batch.column_values(col);
            let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
            !non_null.is_empty() && non_null.iter().all(|v| v.is_number())
        })
        .collect();

    let flags = if batch.len() < OUTLIER_MIN_ROWS || numeric_columns.is_empty() {
        vec![false; batch.len()]
    } else {
        // Nulls are imputed with the column mean for scoring purposes only.
        let mut matrix: Vec<Vec<f64>> = vec![Vec::with_capacity(numeric_columns.len()); batch.len()];
        for column in &numeric_columns {
            let values = batch.column_values(column);
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
            for (row_idx, value) in values.iter().enumerate() {
                matrix[row_idx].push(value.as_f64().unwrap_or(mean));
            }
        }
        outlier_flags(&matrix, config)
    };

    for (row, flag) in batch.rows_mut().iter_mut().zip(flags) {
        row.insert(OUTLIER_COLUMN.to_string(), Value::Bool(flag));
    }
    batch
}

/// Align a batch to its schema: add missing fields with zero values, coerce
/// column types, and encrypt PII columns when the schema requires it.
///
/// Coercion failures downgrade to a logged warning and keep the original
/// value - standardize never rejects a batch. Idempotent: running it on its
/// own output changes nothing (already-encrypted values are recognized and
/// left alone).
fn standardize(mut batch: Batch, ctx: &TransformContext) -> Result<Batch> {
    let schema = ctx.schema.ok_or_else(|| TransformError::MissingContext {
        name: "standardize".to_string(),
        requirement: "a schema".to_string(),
    })?;

    for row in batch.rows_mut() {
        for (field, field_type) in &schema.fields {
            match row.get(field).cloned() {
                None => {
                    row.insert(field.clone(), field_type.zero_value());
                }
                Some(value) if !value.is_null() => match field_type.coerce(&value) {
                    Some(coerced) => {
                        row.insert(field.clone(), coerced);
                    }
                    None => {
                        tracing::warn!(
                            field = %field,
                            expected = ?field_type,
                            "Type coercion failed, keeping original value"
                        );
                    }
                },
                Some(_) => {} // explicit null is preserved
            }
        }
    }

    if schema.encryption_required && !schema.pii_fields.is_empty() {
        // PII encryption is never skipped: a missing codec is an error, not
        // a pass-through.
        let codec = ctx.encryption.ok_or_else(|| TransformError::MissingContext {
            name: "standardize".to_string(),
            requirement: "an encryption codec (schema requires PII encryption)".to_string(),
        })?;

        for field in &schema.pii_fields {
            for row in batch.rows_mut() {
                let Some(value) = row.get(field) else { continue };
                if value.is_null() {
                    continue;
                }
                let plaintext = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let encrypted = codec.encrypt_value(&plaintext)?;
                row.insert(field.clone(), Value::String(encrypted));
            }
        }
    }

    Ok(batch)
}

/// Group-by + aggregate. With no functions given, emits a `count` column
/// per group. Group order follows first occurrence in the batch.
fn aggregate(batch: Batch, spec: &AggregateSpec) -> Result<Batch> {
    if spec.group_by.is_empty() {
        return Err(TransformError::Aggregation(
            "group_by must name at least one column".to_string(),
        ));
    }

    let mut group_order: Vec<Vec<String>> = Vec::new();
    let mut groups: HashMap<Vec<String>, Vec<usize>> = HashMap::new();

    for (idx, row) in batch.rows().iter().enumerate() {
        let key: Vec<String> = spec
            .group_by
            .iter()
            .map(|col| row.get(col).cloned().unwrap_or(Value::Null).to_string())
            .collect();
        if !groups.contains_key(&key) {
            group_order.push(key.clone());
        }
        groups.entry(key).or_default().push(idx);
    }

    let mut out_rows = Vec::with_capacity(group_order.len());
    for key in group_order {
        let indices = &groups[&key];
        let first_row = &batch.rows()[indices[0]];

        let mut out = lakehouse_core::batch::Row::new();
        for col in &spec.group_by {
            out.insert(col.clone(), first_row.get(col).cloned().unwrap_or(Value::Null));
        }

        if spec.functions.is_empty() {
            out.insert("count".to_string(), Value::from(indices.len()));
        } else {
            for (field, func) in &spec.functions {
                let numbers: Vec<f64> = indices
                    .iter()
                    .filter_map(|&i| batch.rows()[i].get(field))
                    .filter_map(|v| v.as_f64())
                    .collect();
                let non_null = indices
                    .iter()
                    .filter_map(|&i| batch.rows()[i].get(field))
                    .filter(|v| !v.is_null())
                    .count();

                let value = match func {
                    AggFn::Count => Value::from(non_null),
                    AggFn::Sum => Value::from(numbers.iter().sum::<f64>()),
                    AggFn::Mean if numbers.is_empty() => Value::Null,
                    AggFn::Mean => Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64),
                    AggFn::Min => numbers
                        .iter()
                        .cloned()
                        .fold(None::<f64>, |acc, n| Some(acc.map_or(n, |a| a.min(n))))
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                    AggFn::Max => numbers
                        .iter()
                        .cloned()
                        .fold(None::<f64>, |acc, n| Some(acc.map_or(n, |a| a.max(n))))
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                };
                out.insert(format!("{}_{}", field, func.as_str()), value);
            }
        }
        out_rows.push(out);
    }

    Ok(Batch::from_rows(out_rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakehouse_core::batch::row;
    use lakehouse_core::FieldType;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn transformer() -> Transformer {
        Transformer::new()
    }

    // Test 1: deduplicate keeps first occurrence order and is idempotent
    #[test]
    fn test_deduplicate_order_and_idempotence() {
        let a = row(&[("k", json!("a"))]);
        let b = row(&[("k", json!("b"))]);
        let c = row(&[("k", json!("c"))]);
        let batch = Batch::from_rows(vec![a.clone(), b.clone(), a.clone(), c.clone()]);

        let once = transformer().deduplicate(batch).unwrap();
        assert_eq!(once.rows(), &[a, b, c]);

        let twice = transformer().deduplicate(once.clone()).unwrap();
        assert_eq!(twice, once);
    }

    // Test 2: handle_nulls fills numeric nulls with the median
    #[test]
    fn test_handle_nulls_numeric_median() {
        let batch = Batch::from_rows(vec![
            row(&[("amount", json!(10))]),
            row(&[("amount", json!(20))]),
            row(&[("amount", json!(30))]),
            row(&[("amount", Value::Null)]),
        ]);
        let filled = transformer()
            .apply("handle_nulls", batch, &TransformContext::empty())
            .unwrap();
        assert_eq!(filled.rows()[3]["amount"], json!(20));
    }

    // Test 3: handle_nulls fills string nulls with the empty string
    #[test]
    fn test_handle_nulls_string_empty() {
        let batch = Batch::from_rows(vec![
            row(&[("name", json!("alice"))]),
            row(&[("name", Value::Null)]),
        ]);
        let filled = transformer()
            .apply("handle_nulls", batch, &TransformContext::empty())
            .unwrap();
        assert_eq!(filled.rows()[1]["name"], json!(""));
    }

    // Test 4: standardize adds missing schema fields with zero values
    #[test]
    fn test_standardize_adds_missing_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), FieldType::Integer);
        fields.insert("b".to_string(), FieldType::String);
        let schema = DataSchema::new("t", fields);

        let batch = Batch::from_rows(vec![row(&[("a", json!(1))])]);
        let out = transformer().standardize(batch, &schema, None).unwrap();
        assert_eq!(out.rows()[0]["b"], json!(""));
    }

    // Test 5: standardize is idempotent
    #[test]
    fn test_standardize_idempotent() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), FieldType::Integer);
        fields.insert("b".to_string(), FieldType::String);
        let schema = DataSchema::new("t", fields);

        let batch = Batch::from_rows(vec![row(&[("a", json!("7"))])]);
        let once = transformer().standardize(batch, &schema, None).unwrap();
        assert_eq!(once.rows()[0]["a"], json!(7));

        let twice = transformer().standardize(once.clone(), &schema, None).unwrap();
        assert_eq!(twice, once);
    }

    // Test 6: coercion failure keeps the original value, no error
    #[test]
    fn test_standardize_coercion_failure_is_soft() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), FieldType::Integer);
        let schema = DataSchema::new("t", fields);

        let batch = Batch::from_rows(vec![row(&[("a", json!("not a number"))])]);
        let out = transformer().standardize(batch, &schema, None).unwrap();
        assert_eq!(out.rows()[0]["a"], json!("not a number"));
    }

    // Test 7: standardize encrypts PII fields and stays idempotent
    #[test]
    fn test_standardize_encrypts_pii() {
        let mut fields = BTreeMap::new();
        fields.insert("email".to_string(), FieldType::String);
        let mut schema = DataSchema::new("users", fields);
        schema.encryption_required = true;
        schema.pii_fields = vec!["email".to_string()];

        let codec = EncryptionCodec::new(&[1u8; 32]).unwrap();
        let batch = Batch::from_rows(vec![row(&[("email", json!("a@b.com"))])]);

        let once = transformer()
            .standardize(batch, &schema, Some(&codec))
            .unwrap();
        let encrypted = once.rows()[0]["email"].as_str().unwrap().to_string();
        assert!(EncryptionCodec::is_encrypted(&encrypted));

        let twice = transformer()
            .standardize(once.clone(), &schema, Some(&codec))
            .unwrap();
        assert_eq!(twice, once);
        assert_eq!(codec.decrypt_value(&encrypted).unwrap(), "a@b.com");
    }

    // Test 8: PII encryption without a codec is an error, never skipped
    #[test]
    fn test_standardize_missing_codec_fails() {
        let mut fields = BTreeMap::new();
        fields.insert("email".to_string(), FieldType::String);
        let mut schema = DataSchema::new("users", fields);
        schema.encryption_required = true;
        schema.pii_fields = vec!["email".to_string()];

        let batch = Batch::from_rows(vec![row(&[("email", json!("a@b.com"))])]);
        let result = transformer().standardize(batch, &schema, None);
        assert!(matches!(result, Err(TransformError::MissingContext { .. })));
    }

    // Test 9: aggregate defaults to a per-group row count
    #[test]
    fn test_aggregate_default_count() {
        let batch = Batch::from_rows(vec![
            row(&[("event_type", json!("view"))]),
            row(&[("event_type", json!("click"))]),
            row(&[("event_type", json!("view"))]),
        ]);
        let spec = AggregateSpec {
            group_by: vec!["event_type".to_string()],
            functions: BTreeMap::new(),
        };
        let out = transformer().aggregate(batch, &spec).unwrap();
        assert_eq!(out.len(), 2);
        // First-occurrence order: view, then click
        assert_eq!(out.rows()[0]["event_type"], json!("view"));
        assert_eq!(out.rows()[0]["count"], json!(2));
        assert_eq!(out.rows()[1]["count"], json!(1));
    }

    // Test 10: aggregate functions over a numeric column
    #[test]
    fn test_aggregate_functions() {
        let batch = Batch::from_rows(vec![
            row(&[("g", json!("x")), ("v", json!(10.0))]),
            row(&[("g", json!("x")), ("v", json!(30.0))]),
            row(&[("g", json!("y")), ("v", json!(5.0))]),
        ]);
        let mut functions = BTreeMap::new();
        functions.insert("v".to_string(), AggFn::Mean);
        let spec = AggregateSpec {
            group_by: vec!["g".to_string()],
            functions,
        };
        let out = transformer().aggregate(batch, &spec).unwrap();
        assert_eq!(out.rows()[0]["v_mean"], json!(20.0));
        assert_eq!(out.rows()[1]["v_mean"], json!(5.0));
    }

    // Test 11: detect_outliers annotates every row and flags the planted one
    #[test]
    fn test_detect_outliers_annotates() {
        let mut rows: Vec<_> = (0..29)
            .map(|i| row(&[("x", json!((i % 5) as f64)), ("y", json!((i % 3) as f64))]))
            .collect();
        rows.push(row(&[("x", json!(1000.0)), ("y", json!(1000.0))]));
        let batch = Batch::from_rows(rows);

        let out = transformer()
            .apply("detect_outliers", batch, &TransformContext::empty())
            .unwrap();
        assert!(out.rows().iter().all(|r| r.contains_key(OUTLIER_COLUMN)));
        assert_eq!(out.rows()[29][OUTLIER_COLUMN], json!(true));
        // Rows are annotated, never dropped
        assert_eq!(out.len(), 30);
    }

    // Test 12: small batches are annotated all-false (not enough signal)
    #[test]
    fn test_detect_outliers_small_batch() {
        let batch = Batch::from_rows(vec![
            row(&[("x", json!(1.0))]),
            row(&[("x", json!(1000.0))]),
        ]);
        let out = transformer()
            .apply("detect_outliers", batch, &TransformContext::empty())
            .unwrap();
        assert!(out.rows().iter().all(|r| r[OUTLIER_COLUMN] == json!(false)));
    }

    // Test 13: unknown transformation name is an error
    #[test]
    fn test_unknown_transformation() {
        let result = transformer().apply("bogus", Batch::new(), &TransformContext::empty());
        assert!(matches!(result, Err(TransformError::UnknownTransformation(_))));
    }

    // Test 14: apply_all runs in caller order
    #[test]
    fn test_apply_all_order() {
        let a = row(&[("k", json!("a")), ("v", Value::Null)]);
        let batch = Batch::from_rows(vec![a.clone(), a.clone(), row(&[("k", json!("b")), ("v", json!("x"))])]);

        let out = transformer()
            .apply_all(&["deduplicate", "handle_nulls"], batch, &TransformContext::empty())
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0]["v"], json!("")); // null filled after dedup
    }
}
