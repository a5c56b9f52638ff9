//! Lakehouse Storage Layer
//!
//! This crate moves partition payloads between memory and a storage medium.
//! The medium is anything implementing `object_store::ObjectStore` - local
//! filesystem for development and tests, S3-compatible object storage in
//! production - chosen by deployment configuration, never by this crate.
//!
//! ## Write Path
//!
//! ```text
//! Batch ──encode (json/csv/parquet)──▶ bytes ──compress──▶ object store
//! ```
//!
//! ## Read Path
//!
//! ```text
//! object store ──get──▶ bytes ──decompress──▶ decode ──▶ Batch
//! ```
//!
//! Content checksums are recorded in the catalog and verified by the
//! orchestrator after decode; this crate is only responsible for moving and
//! (de)serializing bytes faithfully.

pub mod backend;
pub mod error;
pub mod format;

pub use backend::PartitionStore;
pub use error::{Result, StorageError};
