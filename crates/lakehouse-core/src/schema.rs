//! Schema Definitions
//!
//! This module defines the `DataSchema` type - the versioned contract
//! describing what a named data source is expected to look like.
//!
//! ## What is a Schema?
//!
//! A schema binds a source name to:
//! - **fields**: column name -> semantic type (string/integer/float/boolean/datetime)
//! - **primary key** and **partition keys**: ordered subsets of the fields
//! - **validation rules**: not_null / unique / range checks run at ingestion
//! - **retention**: how long archived partitions of this source are kept
//! - **PII declaration**: which fields must be encrypted at rest
//!
//! ## Versioning
//!
//! Schemas are append-only history. Registering a schema under an existing
//! name creates a new version (assigned by the catalog, monotonically
//! increasing); old versions are never physically deleted so lineage can
//! always be resolved against the schema that was current at write time.
//!
//! ## Invariants
//!
//! `primary_key` and `partition_keys` must be subsets of `fields`. This is
//! checked by [`DataSchema::validate`] before a schema is accepted by the
//! catalog.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Semantic type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
}

impl FieldType {
    /// Type-appropriate zero value used when `standardize` adds a missing
    /// column. Datetimes get an explicit null (there is no meaningful zero
    /// instant).
    pub fn zero_value(&self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Integer => Value::from(0_i64),
            FieldType::Float => Value::from(0.0_f64),
            FieldType::Boolean => Value::Bool(false),
            FieldType::Datetime => Value::Null,
        }
    }

    /// Whether `value` already conforms to this type. Null conforms to every
    /// type (nullability is the `not_null` rule's business, not the type
    /// check's).
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Float, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Datetime, Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
            }
            (FieldType::Datetime, Value::Number(n)) => n.is_i64(),
            _ => false,
        }
    }

    /// Try to coerce `value` into this type. Returns `None` when no sensible
    /// coercion exists; callers downgrade that to a warning and keep the
    /// original value.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        if self.matches(value) {
            return Some(value.clone());
        }
        match self {
            FieldType::String => Some(Value::String(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            FieldType::Integer => match value {
                Value::Number(n) => n.as_f64().map(|f| Value::from(f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                Value::Bool(b) => Some(Value::from(*b as i64)),
                _ => None,
            },
            FieldType::Float => match value {
                Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
                Value::Bool(b) => Some(Value::from(*b as i64 as f64)),
                _ => None,
            },
            FieldType::Boolean => match value {
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Some(Value::Bool(true)),
                    "false" | "0" | "no" => Some(Value::Bool(false)),
                    _ => None,
                },
                Value::Number(n) => n.as_i64().map(|i| Value::Bool(i != 0)),
                _ => None,
            },
            FieldType::Datetime => match value {
                // Epoch millis are accepted as-is; anything else must parse.
                Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| Value::from(dt.timestamp_millis())),
                _ => None,
            },
        }
    }
}

/// A single validation rule attached to a schema.
///
/// Rules are evaluated by the quality validator at ingestion time; any
/// failing rule rejects the whole batch (when quality checks are enabled).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Field must have no null/missing values.
    NotNull { field: String },
    /// Field values must be unique across the batch.
    Unique { field: String },
    /// Numeric field values must fall within `[min, max]`.
    Range { field: String, min: f64, max: f64 },
}

impl ValidationRule {
    /// The field this rule applies to.
    pub fn field(&self) -> &str {
        match self {
            ValidationRule::NotNull { field } => field,
            ValidationRule::Unique { field } => field,
            ValidationRule::Range { field, .. } => field,
        }
    }
}

/// A named, versioned data contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    /// Source name (unique identifier; versions share the name)
    pub name: String,

    /// Schema version (assigned by the catalog, starts at 1)
    #[serde(default)]
    pub version: u32,

    /// Column name -> semantic type
    pub fields: BTreeMap<String, FieldType>,

    /// Ordered primary key fields (subset of `fields`)
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Ordered partition key fields (subset of `fields`)
    #[serde(default)]
    pub partition_keys: Vec<String>,

    /// Validation rules evaluated at ingestion
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,

    /// Retention for archived partitions, in seconds (None = default policy)
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Whether PII fields must be encrypted at rest
    #[serde(default)]
    pub encryption_required: bool,

    /// Fields containing PII (encrypted when `encryption_required`)
    #[serde(default)]
    pub pii_fields: Vec<String>,
}

impl DataSchema {
    /// Create a minimal schema with just a name and fields.
    pub fn new(name: impl Into<String>, fields: BTreeMap<String, FieldType>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            fields,
            primary_key: Vec::new(),
            partition_keys: Vec::new(),
            validation_rules: Vec::new(),
            retention_secs: None,
            encryption_required: false,
            pii_fields: Vec::new(),
        }
    }

    /// Check the schema's internal invariants.
    ///
    /// # Errors
    ///
    /// `InvalidSchema` when a primary/partition key or rule references a
    /// field that is not declared in `fields`.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidSchema {
                name: self.name.clone(),
                reason: "schema name must not be empty".to_string(),
            });
        }
        for key in self.primary_key.iter().chain(self.partition_keys.iter()) {
            if !self.fields.contains_key(key) {
                return Err(Error::InvalidSchema {
                    name: self.name.clone(),
                    reason: format!("key field '{}' is not a declared field", key),
                });
            }
        }
        for rule in &self.validation_rules {
            if !self.fields.contains_key(rule.field()) {
                return Err(Error::InvalidSchema {
                    name: self.name.clone(),
                    reason: format!("rule references undeclared field '{}'", rule.field()),
                });
            }
        }
        Ok(())
    }

    /// Retention for archived partitions of this source.
    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_schema() -> DataSchema {
        let mut fields = BTreeMap::new();
        fields.insert("user_id".to_string(), FieldType::String);
        fields.insert("event_type".to_string(), FieldType::String);
        fields.insert("amount".to_string(), FieldType::Float);
        let mut schema = DataSchema::new("events", fields);
        schema.partition_keys = vec!["event_type".to_string()];
        schema.primary_key = vec!["user_id".to_string()];
        schema
    }

    #[test]
    fn test_valid_schema_passes_validation() {
        assert!(event_schema().validate().is_ok());
    }

    #[test]
    fn test_undeclared_partition_key_rejected() {
        let mut schema = event_schema();
        schema.partition_keys.push("region".to_string());
        let err = schema.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { .. }));
    }

    #[test]
    fn test_rule_on_undeclared_field_rejected() {
        let mut schema = event_schema();
        schema.validation_rules.push(ValidationRule::NotNull {
            field: "missing".to_string(),
        });
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_type_matches() {
        assert!(FieldType::Integer.matches(&Value::from(42)));
        assert!(!FieldType::Integer.matches(&Value::from(4.2)));
        assert!(FieldType::Float.matches(&Value::from(42)));
        assert!(FieldType::Datetime.matches(&Value::from("2026-01-01T00:00:00Z")));
        assert!(!FieldType::Datetime.matches(&Value::from("not a date")));
        // Null conforms to every type
        assert!(FieldType::Boolean.matches(&Value::Null));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(
            FieldType::Integer.coerce(&Value::from("17")),
            Some(Value::from(17))
        );
        assert_eq!(
            FieldType::Boolean.coerce(&Value::from("yes")),
            Some(Value::Bool(true))
        );
        assert_eq!(
            FieldType::String.coerce(&Value::from(3)),
            Some(Value::from("3"))
        );
        assert_eq!(FieldType::Integer.coerce(&Value::from("abc")), None);
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(FieldType::String.zero_value(), Value::from(""));
        assert_eq!(FieldType::Integer.zero_value(), Value::from(0));
        assert_eq!(FieldType::Datetime.zero_value(), Value::Null);
    }

    #[test]
    fn test_rule_serde_round_trip() {
        let rule = ValidationRule::Range {
            field: "amount".to_string(),
            min: 0.0,
            max: 100.0,
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"rule\":\"range\""));
        let back: ValidationRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
