//! Lakehouse Metadata Catalog
//!
//! This crate is the single source of truth for "what data exists where".
//! While the storage backend holds the actual partition payloads, the
//! catalog tracks:
//!
//! - **Schemas**: versioned contracts for each source (append-only history)
//! - **Partitions**: one row per stored payload - layer, location, size,
//!   record count, checksum
//! - **Lineage**: which partitions were derived from which, and how
//!
//! ## Why a Catalog?
//!
//! Without metadata, every query would have to list and open storage objects
//! to find out what they contain. With the catalog, partition pruning is a
//! single indexed query and never touches payload bytes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐      ┌──────────────────┐
//! │  Object Store   │ ←──→ │  CachedCatalog   │ ◄── You are here
//! │  (payloads)     │      │  moka TTL cache  │
//! └─────────────────┘      │        │         │
//!                          │  SqliteCatalog   │
//!                          │  (durable rows)  │
//!                          └──────────────────┘
//! ```
//!
//! The durable store is authoritative; the cache is an optimization and is
//! never consulted for correctness-critical listings (`find_partitions`
//! always hits the durable store).
//!
//! ## Usage
//!
//! ```ignore
//! use lakehouse_catalog::{CachedCatalog, SqliteCatalogStore, CacheConfig};
//!
//! let store = SqliteCatalogStore::new("catalog.db").await?;
//! let catalog = CachedCatalog::new(Arc::new(store), CacheConfig::default());
//!
//! let version = catalog.register_schema(&schema).await?;
//! catalog.register_partition(&partition).await?;
//! let hits = catalog.find_partitions(Some("events"), LakeLayer::Raw, &filters).await?;
//! ```

pub mod cached;
pub mod error;
pub mod sqlite;
pub mod store;

pub use cached::{CacheConfig, CachedCatalog};
pub use error::{CatalogError, Result};
pub use sqlite::SqliteCatalogStore;
pub use store::{CatalogStore, LayerStats, LineageRecord};
