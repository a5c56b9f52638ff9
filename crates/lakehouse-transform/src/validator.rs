//! Batch Quality Validation
//!
//! [`QualityValidator::validate`] is a pure function from `(batch, schema)`
//! to a [`ValidationReport`]. Given the same inputs it always produces the
//! same errors, warnings and metrics - callers rely on that determinism to
//! re-run validation safely after a retry.
//!
//! ## Severity Model
//!
//! - **Missing field** (schema declares it, batch has no such column):
//!   hard error, batch is invalid.
//! - **Type mismatch**: warning only. Schema drift is flagged for operators
//!   but does not block ingestion - standardize will coerce what it can.
//! - **Failed validation rule** (`not_null`, `unique`, `range`): hard error.
//!
//! Quality metrics are computed on every call, pass or fail, so operators
//! see the quality of rejected batches too.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lakehouse_core::{Batch, DataSchema, FieldType, ValidationRule};

/// Data-quality metrics, all in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// 1 - (null cells / total cells), over the batch's columns
    pub completeness: f64,
    /// distinct rows / total rows
    pub uniqueness: f64,
    /// fraction of non-null cells conforming to the schema type
    pub consistency: f64,
    /// fraction of validation rules that passed
    pub accuracy: f64,
    /// 1.0 when the schema's datetime fields carry parseable values
    pub timeliness: f64,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            completeness: 1.0,
            uniqueness: 1.0,
            consistency: 1.0,
            accuracy: 1.0,
            timeliness: 1.0,
        }
    }
}

/// Outcome of validating one batch against one schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: QualityMetrics,
}

/// Stateless validator. Constructed once and shared freely.
#[derive(Debug, Clone, Default)]
pub struct QualityValidator;

impl QualityValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `batch` against `schema`. Pure - no side effects, no
    /// mutation, deterministic output.
    pub fn validate(&self, batch: &Batch, schema: &DataSchema) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let columns: HashSet<String> = batch.columns().into_iter().collect();

        // Missing-field check: hard errors.
        for field in schema.fields.keys() {
            if !columns.contains(field) {
                errors.push(format!("Missing required field '{}'", field));
            }
        }

        // Type check: warnings only (schema drift, not rejection).
        for (field, expected) in &schema.fields {
            if !columns.contains(field) {
                continue;
            }
            let mismatches = batch
                .column_values(field)
                .iter()
                .filter(|v| !expected.matches(v))
                .count();
            if mismatches > 0 {
                warnings.push(format!(
                    "Field '{}' has {} value(s) not matching expected type {:?}",
                    field, mismatches, expected
                ));
            }
        }

        // Rule checks: hard errors.
        let mut rules_passed = 0usize;
        for rule in &schema.validation_rules {
            match self.check_rule(batch, rule) {
                Ok(()) => rules_passed += 1,
                Err(message) => errors.push(message),
            }
        }

        let metrics = self.compute_metrics(batch, schema, rules_passed);

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
            metrics,
        }
    }

    fn check_rule(&self, batch: &Batch, rule: &ValidationRule) -> std::result::Result<(), String> {
        match rule {
            ValidationRule::NotNull { field } => {
                let nulls = batch
                    .column_values(field)
                    .iter()
                    .filter(|v| v.is_null())
                    .count();
                if nulls > 0 {
                    Err(format!(
                        "Rule not_null failed: field '{}' has {} null value(s)",
                        field, nulls
                    ))
                } else {
                    Ok(())
                }
            }
            ValidationRule::Unique { field } => {
                let values = batch.column_values(field);
                let distinct: HashSet<String> = values.iter().map(|v| v.to_string()).collect();
                if distinct.len() < values.len() {
                    Err(format!(
                        "Rule unique failed: field '{}' has {} duplicate value(s)",
                        field,
                        values.len() - distinct.len()
                    ))
                } else {
                    Ok(())
                }
            }
            ValidationRule::Range { field, min, max } => {
                let out_of_range = batch
                    .column_values(field)
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .filter(|n| n < min || n > max)
                    .count();
                if out_of_range > 0 {
                    Err(format!(
                        "Rule range failed: field '{}' has {} value(s) outside [{}, {}]",
                        field, out_of_range, min, max
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn compute_metrics(
        &self,
        batch: &Batch,
        schema: &DataSchema,
        rules_passed: usize,
    ) -> QualityMetrics {
        if batch.is_empty() {
            return QualityMetrics::default();
        }

        let columns = batch.columns();
        let total_cells = batch.len() * columns.len();
        let null_cells: usize = columns
            .iter()
            .map(|col| {
                batch
                    .column_values(col)
                    .iter()
                    .filter(|v| v.is_null())
                    .count()
            })
            .sum();
        let completeness = if total_cells == 0 {
            1.0
        } else {
            1.0 - null_cells as f64 / total_cells as f64
        };

        let distinct_rows: HashSet<Vec<u8>> = batch
            .rows()
            .iter()
            .map(|row| serde_json::to_vec(row).unwrap_or_default())
            .collect();
        let uniqueness = distinct_rows.len() as f64 / batch.len() as f64;

        // Consistency: non-null cells of schema-declared columns that
        // conform to the declared type.
        let mut typed_cells = 0usize;
        let mut conforming_cells = 0usize;
        for (field, expected) in &schema.fields {
            for value in batch.column_values(field) {
                if value.is_null() {
                    continue;
                }
                typed_cells += 1;
                if expected.matches(&value) {
                    conforming_cells += 1;
                }
            }
        }
        let consistency = if typed_cells == 0 {
            1.0
        } else {
            conforming_cells as f64 / typed_cells as f64
        };

        let accuracy = if schema.validation_rules.is_empty() {
            1.0
        } else {
            rules_passed as f64 / schema.validation_rules.len() as f64
        };

        // Timeliness: datetime fields must carry at least one parseable value.
        let datetime_fields: Vec<&String> = schema
            .fields
            .iter()
            .filter(|(_, t)| **t == FieldType::Datetime)
            .map(|(name, _)| name)
            .collect();
        let timeliness = if datetime_fields.is_empty() {
            1.0
        } else {
            let with_values = datetime_fields
                .iter()
                .filter(|field| {
                    batch
                        .column_values(field)
                        .iter()
                        .any(|v| !v.is_null() && FieldType::Datetime.matches(v))
                })
                .count();
            with_values as f64 / datetime_fields.len() as f64
        };

        QualityMetrics {
            completeness,
            uniqueness,
            consistency,
            accuracy,
            timeliness,
        }
    }
}
