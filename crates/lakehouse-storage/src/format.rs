//! Payload Serialization
//!
//! Encode/decode between the in-memory [`Batch`] and the on-disk formats.
//!
//! ## Supported Formats
//!
//! - **JSON**: an array of row objects. The default interchange format and
//!   the canonical one (checksums are computed over it).
//! - **CSV**: header row + stringified cells. Scalars are re-inferred on
//!   read (int, then float, then bool, else string).
//! - **Parquet**: columnar via Arrow. Column types are inferred from the
//!   batch (Int64 / Float64 / Boolean / Utf8).
//!
//! Avro, XML, XLSX and ORC are declared upstream but not implemented;
//! encoding or decoding them fails with `UnsupportedFormat` rather than
//! guessing.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde_json::Value;

use lakehouse_core::batch::{Batch, Row};
use lakehouse_core::DataFormat;

use crate::error::{Result, StorageError};

/// Serialize a batch into `format`.
pub fn encode_batch(batch: &Batch, format: DataFormat) -> Result<Vec<u8>> {
    match format {
        DataFormat::Json => encode_json(batch),
        DataFormat::Csv => encode_csv(batch),
        DataFormat::Parquet => encode_parquet(batch),
        other => Err(StorageError::UnsupportedFormat(other.to_string())),
    }
}

/// Deserialize a batch from `format`.
pub fn decode_batch(data: &[u8], format: DataFormat) -> Result<Batch> {
    match format {
        DataFormat::Json => decode_json(data),
        DataFormat::Csv => decode_csv(data),
        DataFormat::Parquet => decode_parquet(data),
        other => Err(StorageError::UnsupportedFormat(other.to_string())),
    }
}

// ============================================================
// JSON
// ============================================================

fn encode_json(batch: &Batch) -> Result<Vec<u8>> {
    serde_json::to_vec(batch.rows()).map_err(|e| StorageError::Encode {
        format: "json".to_string(),
        message: e.to_string(),
    })
}

fn decode_json(data: &[u8]) -> Result<Batch> {
    let rows: Vec<Row> = serde_json::from_slice(data).map_err(|e| StorageError::Decode {
        format: "json".to_string(),
        message: e.to_string(),
    })?;
    Ok(Batch::from_rows(rows))
}

// ============================================================
// CSV
// ============================================================

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Re-infer a scalar from CSV text: int, then float, then bool, else string.
fn parse_csv_cell(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        return Value::from(f);
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

fn encode_csv(batch: &Batch) -> Result<Vec<u8>> {
    let columns = batch.columns();
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let mut writer = csv::Writer::from_writer(Vec::new());

    let encode_err = |e: csv::Error| StorageError::Encode {
        format: "csv".to_string(),
        message: e.to_string(),
    };

    writer.write_record(&columns).map_err(encode_err)?;
    for row in batch.rows() {
        let record: Vec<String> = columns
            .iter()
            .map(|col| row.get(col).map(cell_to_string).unwrap_or_default())
            .collect();
        writer.write_record(&record).map_err(encode_err)?;
    }

    writer.into_inner().map_err(|e| StorageError::Encode {
        format: "csv".to_string(),
        message: e.to_string(),
    })
}

fn decode_csv(data: &[u8]) -> Result<Batch> {
    let mut reader = csv::Reader::from_reader(data);
    let decode_err = |e: csv::Error| StorageError::Decode {
        format: "csv".to_string(),
        message: e.to_string(),
    };

    let headers = reader.headers().map_err(decode_err)?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(decode_err)?;
        let mut row = Row::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), parse_csv_cell(cell));
        }
        rows.push(row);
    }
    Ok(Batch::from_rows(rows))
}

// ============================================================
// Parquet (via Arrow)
// ============================================================

#[derive(Clone, Copy, PartialEq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

/// Infer the narrowest Arrow type that holds every non-null value of a
/// column. Mixed int/float widens to float; any other mix falls back to
/// text.
fn infer_column_kind(values: &[Value]) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for value in values {
        let observed = match value {
            Value::Null => continue,
            Value::Number(n) if n.is_i64() || n.is_u64() => ColumnKind::Int,
            Value::Number(_) => ColumnKind::Float,
            Value::Bool(_) => ColumnKind::Bool,
            _ => ColumnKind::Text,
        };
        kind = Some(match (kind, observed) {
            (None, observed) => observed,
            (Some(current), observed) if current == observed => current,
            (Some(ColumnKind::Int), ColumnKind::Float)
            | (Some(ColumnKind::Float), ColumnKind::Int) => ColumnKind::Float,
            _ => ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn build_array(values: &[Value], kind: ColumnKind) -> ArrayRef {
    match kind {
        ColumnKind::Int => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| v.as_i64())
                .collect::<Vec<Option<i64>>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| v.as_f64())
                .collect::<Vec<Option<f64>>>(),
        )),
        ColumnKind::Bool => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| v.as_bool())
                .collect::<Vec<Option<bool>>>(),
        )),
        ColumnKind::Text => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<Option<String>>>(),
        )),
    }
}

fn kind_to_data_type(kind: ColumnKind) -> DataType {
    match kind {
        ColumnKind::Int => DataType::Int64,
        ColumnKind::Float => DataType::Float64,
        ColumnKind::Bool => DataType::Boolean,
        ColumnKind::Text => DataType::Utf8,
    }
}

fn encode_parquet(batch: &Batch) -> Result<Vec<u8>> {
    let encode_err = |message: String| StorageError::Encode {
        format: "parquet".to_string(),
        message,
    };

    let columns = batch.columns();
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

    for column in &columns {
        let values = batch.column_values(column);
        let kind = infer_column_kind(&values);
        fields.push(Field::new(column, kind_to_data_type(kind), true));
        arrays.push(build_array(&values, kind));
    }

    let schema = Arc::new(Schema::new(fields));
    let record_batch = if columns.is_empty() {
        RecordBatch::new_empty(schema.clone())
    } else {
        RecordBatch::try_new(schema.clone(), arrays).map_err(|e| encode_err(e.to_string()))?
    };

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)
        .map_err(|e| encode_err(e.to_string()))?;
    writer
        .write(&record_batch)
        .map_err(|e| encode_err(e.to_string()))?;
    writer.close().map_err(|e| encode_err(e.to_string()))?;
    Ok(buffer)
}

fn decode_parquet(data: &[u8]) -> Result<Batch> {
    let decode_err = |message: String| StorageError::Decode {
        format: "parquet".to_string(),
        message,
    };

    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::copy_from_slice(data))
        .map_err(|e| decode_err(e.to_string()))?
        .build()
        .map_err(|e| decode_err(e.to_string()))?;

    let mut rows = Vec::new();
    for record_batch in reader {
        let record_batch = record_batch.map_err(|e| decode_err(e.to_string()))?;
        let schema = record_batch.schema();

        for row_idx in 0..record_batch.num_rows() {
            let mut row = Row::new();
            for (col_idx, field) in schema.fields().iter().enumerate() {
                let array = record_batch.column(col_idx);
                let value = array_value(array, row_idx, field.data_type())
                    .map_err(|message| decode_err(message))?;
                row.insert(field.name().clone(), value);
            }
            rows.push(row);
        }
    }
    Ok(Batch::from_rows(rows))
}

fn array_value(array: &ArrayRef, idx: usize, data_type: &DataType) -> std::result::Result<Value, String> {
    if array.is_null(idx) {
        return Ok(Value::Null);
    }
    match data_type {
        DataType::Int64 => {
            let array = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or("expected Int64Array")?;
            Ok(Value::from(array.value(idx)))
        }
        DataType::Float64 => {
            let array = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or("expected Float64Array")?;
            Ok(Value::from(array.value(idx)))
        }
        DataType::Boolean => {
            let array = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or("expected BooleanArray")?;
            Ok(Value::Bool(array.value(idx)))
        }
        DataType::Utf8 => {
            let array = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or("expected StringArray")?;
            Ok(Value::String(array.value(idx).to_string()))
        }
        other => Err(format!("unsupported parquet column type {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakehouse_core::batch::row;
    use serde_json::json;

    fn sample() -> Batch {
        Batch::from_rows(vec![
            row(&[
                ("user_id", json!("u1")),
                ("amount", json!(10.5)),
                ("clicks", json!(3)),
                ("active", json!(true)),
            ]),
            row(&[
                ("user_id", json!("u2")),
                ("amount", json!(0.25)),
                ("clicks", json!(7)),
                ("active", json!(false)),
            ]),
        ])
    }

    #[test]
    fn test_json_round_trip() {
        let batch = sample();
        let bytes = encode_batch(&batch, DataFormat::Json).unwrap();
        let back = decode_batch(&bytes, DataFormat::Json).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn test_parquet_round_trip() {
        let batch = sample();
        let bytes = encode_batch(&batch, DataFormat::Parquet).unwrap();
        let back = decode_batch(&bytes, DataFormat::Parquet).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.rows()[0]["user_id"], json!("u1"));
        assert_eq!(back.rows()[0]["clicks"], json!(3));
        assert_eq!(back.rows()[1]["amount"], json!(0.25));
        assert_eq!(back.rows()[1]["active"], json!(false));
    }

    #[test]
    fn test_csv_round_trip_with_inference() {
        let batch = sample();
        let bytes = encode_batch(&batch, DataFormat::Csv).unwrap();
        let back = decode_batch(&bytes, DataFormat::Csv).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.rows()[0]["clicks"], json!(3));
        assert_eq!(back.rows()[0]["amount"], json!(10.5));
        assert_eq!(back.rows()[0]["active"], json!(true));
        assert_eq!(back.rows()[1]["user_id"], json!("u2"));
    }

    #[test]
    fn test_parquet_nulls_survive() {
        let batch = Batch::from_rows(vec![
            row(&[("a", json!(1)), ("b", json!("x"))]),
            row(&[("a", json!(2))]), // b missing -> null
        ]);
        let bytes = encode_batch(&batch, DataFormat::Parquet).unwrap();
        let back = decode_batch(&bytes, DataFormat::Parquet).unwrap();
        assert_eq!(back.rows()[1].get("b"), Some(&Value::Null));
    }

    #[test]
    fn test_mixed_int_float_widens() {
        let values = vec![json!(1), json!(2.5), Value::Null];
        assert!(matches!(infer_column_kind(&values), ColumnKind::Float));
    }

    #[test]
    fn test_unsupported_formats_rejected() {
        let batch = sample();
        for format in [DataFormat::Avro, DataFormat::Xml, DataFormat::Xlsx, DataFormat::Orc] {
            assert!(matches!(
                encode_batch(&batch, format),
                Err(StorageError::UnsupportedFormat(_))
            ));
        }
    }

    #[test]
    fn test_empty_batch_round_trips() {
        let batch = Batch::new();
        for format in [DataFormat::Json, DataFormat::Csv, DataFormat::Parquet] {
            let bytes = encode_batch(&batch, format).unwrap();
            let back = decode_batch(&bytes, format).unwrap();
            assert!(back.is_empty(), "format {}", format);
        }
    }
}
