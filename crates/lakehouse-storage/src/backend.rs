//! Partition Payload Store
//!
//! [`PartitionStore`] is the single interface the orchestrator uses to move
//! partition payloads in and out of storage. It composes the format codec
//! (encode/decode) with the compression codec and an `ObjectStore`
//! implementation.
//!
//! ## Failure Semantics
//!
//! - `write` either persists the full payload or returns an error - there is
//!   no partial object (object stores give us that atomicity per key).
//! - `read` failures mean the bytes are missing or corrupt; callers on the
//!   query path skip the partition with a warning, callers on the
//!   maintenance path surface the error.
//! - `delete` of a missing object is reported by the backing store; the
//!   orchestrator treats that as already-done during cleanup.

use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};

use lakehouse_core::{codec, Batch, Compression, DataFormat};
use lakehouse_observability::metrics;

use crate::error::{Result, StorageError};
use crate::format;

/// Reads and writes partition payloads against an object store.
pub struct PartitionStore {
    store: Arc<dyn ObjectStore>,
}

impl PartitionStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Access to the underlying object store (used by tests and tooling).
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    /// Compress and persist already-encoded payload bytes. Returns the
    /// stored size (after compression) - this is what partition metadata
    /// records. Callers that need the content checksum hash `encoded`
    /// before handing it over (see [`lakehouse_core::batch::checksum_bytes`]).
    pub async fn write_bytes(
        &self,
        encoded: &[u8],
        key: &str,
        compression: Compression,
    ) -> Result<u64> {
        let compressed = codec::compress(encoded, compression)?;
        let size = compressed.len() as u64;

        let path = ObjectPath::from(key);
        self.store.put(&path, Bytes::from(compressed)).await?;
        metrics::STORAGE_REQUESTS_TOTAL.with_label_values(&["put"]).inc();

        tracing::debug!(
            key = %key,
            compression = %compression,
            stored_bytes = size,
            "Wrote partition payload"
        );
        Ok(size)
    }

    /// Fetch and decompress payload bytes. When `expected_checksum` is
    /// given, the decompressed bytes are verified against it and a mismatch
    /// is an error - silent corruption must never decode into a batch.
    pub async fn read_bytes(
        &self,
        key: &str,
        compression: Compression,
        expected_checksum: Option<&str>,
    ) -> Result<Vec<u8>> {
        let path = ObjectPath::from(key);
        let data = self.store.get(&path).await?.bytes().await?;
        metrics::STORAGE_REQUESTS_TOTAL.with_label_values(&["get"]).inc();

        let decompressed = codec::decompress(&data, compression)?;
        if let Some(expected) = expected_checksum {
            let actual = lakehouse_core::batch::checksum_bytes(&decompressed);
            if actual != expected {
                return Err(StorageError::ChecksumMismatch { key: key.to_string() });
            }
        }
        Ok(decompressed)
    }

    /// Encode, compress and persist a batch. Returns the stored size.
    pub async fn write(
        &self,
        batch: &Batch,
        key: &str,
        format: DataFormat,
        compression: Compression,
    ) -> Result<u64> {
        let encoded = format::encode_batch(batch, format)?;
        self.write_bytes(&encoded, key, compression).await
    }

    /// Fetch, decompress and decode a partition payload.
    pub async fn read(
        &self,
        key: &str,
        format: DataFormat,
        compression: Compression,
    ) -> Result<Batch> {
        let decompressed = self.read_bytes(key, compression, None).await?;
        format::decode_batch(&decompressed, format)
    }

    /// Delete a payload. Bytes are deleted before metadata on the removal
    /// path: a dangling metadata row is recoverable, a dangling file is not.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = ObjectPath::from(key);
        self.store.delete(&path).await?;
        metrics::STORAGE_REQUESTS_TOTAL.with_label_values(&["delete"]).inc();
        Ok(())
    }

    /// List stored objects under a prefix. Used by the orphan sweep to
    /// reconcile storage against the catalog.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        let prefix_path = prefix.map(ObjectPath::from);
        let objects: Vec<ObjectMeta> = self
            .store
            .list(prefix_path.as_ref())
            .try_collect()
            .await?;
        metrics::STORAGE_REQUESTS_TOTAL.with_label_values(&["list"]).inc();
        Ok(objects)
    }
}
