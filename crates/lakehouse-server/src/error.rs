//! Warehouse Error Taxonomy
//!
//! One enum joins every component failure at the orchestrator boundary.
//! The propagation policy:
//!
//! - **Ingestion** is all-or-nothing: validation and storage-write failures
//!   abort before any metadata is registered.
//! - **Query** prefers partial results: a single partition's read error is
//!   skipped with a warning, not raised (see the warehouse query path) -
//!   only metadata-store failures abort a query.
//! - **Streaming** handler errors never reach this enum; they are isolated
//!   per message inside the consume loop.
//!
//! Every error carries a stable `error_type()` label and every raise
//! increments the typed error counter - nothing fails silently.

use thiserror::Error;

use lakehouse_observability::metrics;

pub type Result<T> = std::result::Result<T, WarehouseError>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Schema validation failed: {}", errors.join("; "))]
    SchemaValidation { errors: Vec<String> },

    #[error("Storage write failed: {0}")]
    StorageWrite(#[source] lakehouse_storage::StorageError),

    #[error("Storage read failed: {0}")]
    StorageRead(#[source] lakehouse_storage::StorageError),

    #[error("Metadata store error: {0}")]
    MetadataStore(#[from] lakehouse_catalog::CatalogError),

    #[error("Transform error: {0}")]
    Transform(#[from] lakehouse_transform::TransformError),

    #[error("Stream error: {0}")]
    Stream(#[from] lakehouse_stream::StreamError),

    #[error("Codec error: {0}")]
    Codec(#[from] lakehouse_core::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No promotion target from layer '{0}'")]
    InvalidPromotion(String),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl WarehouseError {
    /// Stable label for the typed error counter.
    pub fn error_type(&self) -> &'static str {
        match self {
            WarehouseError::SchemaValidation { .. } => "schema_validation",
            WarehouseError::StorageWrite(_) => "storage_write",
            WarehouseError::StorageRead(_) => "storage_read",
            WarehouseError::MetadataStore(_) => "metadata_store",
            WarehouseError::Transform(_) => "transform",
            WarehouseError::Stream(_) => "stream",
            WarehouseError::Codec(_) => "codec",
            WarehouseError::InvalidInput(_) => "invalid_input",
            WarehouseError::InvalidPromotion(_) => "invalid_promotion",
            WarehouseError::Join(_) => "task_join",
        }
    }

    /// Count this error under its type label and log it. Returns `self` so
    /// call sites can `return Err(e.observed())`.
    pub fn observed(self) -> Self {
        metrics::ERRORS_TOTAL
            .with_label_values(&[self.error_type()])
            .inc();
        tracing::error!(error_type = self.error_type(), error = %self, "Warehouse operation failed");
        self
    }
}
