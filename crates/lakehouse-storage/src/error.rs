//! Storage Error Types
//!
//! Write failures abort ingestion before any metadata is registered, so a
//! failed put can never leave orphan metadata. Read failures are the
//! opposite: the query path treats a partition that fails to load as
//! skippable and proceeds with the rest (partial results beat total failure
//! on reads).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] lakehouse_core::Error),

    #[error("Unsupported data format: {0}")]
    UnsupportedFormat(String),

    #[error("Encode error ({format}): {message}")]
    Encode { format: String, message: String },

    #[error("Decode error ({format}): {message}")]
    Decode { format: String, message: String },

    #[error("Checksum mismatch for '{key}': payload is corrupt")]
    ChecksumMismatch { key: String },
}
