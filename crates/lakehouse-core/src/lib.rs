//! Core types for the lakehouse.
//!
//! This crate defines the data model shared by every other lakehouse crate:
//!
//! - [`Batch`] - the in-memory tabular unit all validation/transformation
//!   operates on
//! - [`DataSchema`] - the versioned contract for a named data source
//! - [`DataPartition`] - metadata for one immutable stored unit of data
//! - [`IngestionConfig`] - transient per-source ingestion settings
//! - [`codec`] - byte-level compression (LZ4, Zstd)
//! - [`crypto`] - field-level AES-256-GCM encryption for PII columns
//!
//! Everything here is passive data plus pure functions. Stateful components
//! (catalog, storage, streaming) live in their own crates and depend on this
//! one.

pub mod batch;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod ingest;
pub mod partition;
pub mod schema;

pub use batch::Batch;
pub use codec::Compression;
pub use crypto::EncryptionCodec;
pub use error::{Error, Result};
pub use ingest::{BatchInput, DataFormat, IngestionConfig, ProcessingMode, SourceType};
pub use partition::{DataPartition, LakeLayer};
pub use schema::{DataSchema, FieldType, ValidationRule};
