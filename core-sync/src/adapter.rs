//! Local record adapter contract.
//!
//! The engine never parses record-type-specific structure. Per record
//! type, the owning module supplies these two callbacks; content crosses
//! the boundary as an opaque byte payload with a declared MIME type.
//! Encryption-at-rest, when present, is the adapter's concern — the
//! engine only ever sees bytes appropriate to the local storage layer's
//! contract.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failure inside an adapter callback
#[derive(Error, Debug)]
#[error("{0}")]
pub struct AdapterError(pub String);

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Opaque serialized record content
#[derive(Debug, Clone)]
pub struct RecordContent {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl RecordContent {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Callbacks a record owner supplies to the engine, one per record type.
#[async_trait]
pub trait RecordAdapter: Send + Sync {
    /// Supply the serialized content of a local record.
    ///
    /// Returns `Ok(None)` when the record no longer exists locally; the
    /// engine then falls back to the file cache before failing the item.
    async fn load_local_content(&self, record_id: &str) -> AdapterResult<Option<RecordContent>>;

    /// Persist downloaded content into the local record.
    async fn save_local_content(&self, record_id: &str, content: Bytes) -> AdapterResult<()>;
}
