//! Lakehouse Observability
//!
//! Prometheus metrics for every lakehouse component, plus an axum router
//! exposing them in text format for pull-based scraping.
//!
//! ## What Gets Measured
//!
//! - **Ingestion**: records/batches by source and format, rejected batches,
//!   per-operation latency
//! - **Query**: query count, partitions scanned, latency
//! - **Storage**: bytes and partition counts per layer, backend
//!   request/error counters
//! - **Streaming**: messages published/processed, handler failures
//! - **Catalog cache**: hits and misses
//! - **Errors**: one counter vector labeled by error type - nothing fails
//!   silently
//!
//! ## Usage
//!
//! ```ignore
//! use lakehouse_observability::metrics;
//!
//! metrics::init();
//! metrics::INGEST_RECORDS_TOTAL
//!     .with_label_values(&["bookings", "json"])
//!     .inc_by(1024);
//! ```

pub mod exporter;
pub mod metrics;

pub use exporter::{create_metrics_router, metrics_handler};
