//! Catalog Error Types
//!
//! A catalog failure on the durable store is fatal for the operation that
//! hit it: no metadata means no correctness guarantee, so both ingestion and
//! query fail hard on `Database` errors. The cache is never authoritative
//! and cache trouble never surfaces as an error here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid schema: {0}")]
    InvalidSchema(#[from] lakehouse_core::Error),

    #[error("Corrupt catalog row: {0}")]
    Corrupt(String),
}
