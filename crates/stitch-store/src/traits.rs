use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::error::StoreResult;

/// Async byte stream over a stored blob.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Metadata of one stored blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Flat, keyed blob store.
///
/// All implementations must satisfy these invariants:
/// - `put` replaces any previous blob under the key atomically.
/// - A blob written through [`BlobStore::put_stream`] becomes visible only
///   when [`BlobWriter::finish`] succeeds.
/// - `list` never reports in-flight temporaries.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous blob.
    ///
    /// Returns the number of bytes now stored under the key.
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<u64>;

    /// Read a whole blob. Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Open a blob for streaming reads. Returns `Ok(None)` if absent.
    async fn open(&self, key: &str) -> StoreResult<Option<BlobReader>>;

    /// Size and modification time of a blob, if present.
    async fn stat(&self, key: &str) -> StoreResult<Option<BlobMeta>>;

    /// Delete a blob. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// List every visible blob, in no particular order.
    async fn list(&self) -> StoreResult<Vec<BlobMeta>>;

    /// Begin a streaming write that lands under `key` on `finish`.
    async fn put_stream(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.stat(key).await?.is_some())
    }

    /// List blobs whose key starts with `prefix`.
    ///
    /// Default implementation filters [`BlobStore::list`]. Backends may
    /// override when they can narrow the scan.
    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<BlobMeta>> {
        let mut all = self.list().await?;
        all.retain(|meta| meta.key.starts_with(prefix));
        Ok(all)
    }
}

/// In-progress streaming write.
#[async_trait]
pub trait BlobWriter: Send {
    /// Append bytes to the pending blob.
    async fn write(&mut self, data: Bytes) -> StoreResult<()>;

    /// Make the blob visible under its key. Returns the total size.
    async fn finish(self: Box<Self>) -> StoreResult<u64>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> StoreResult<()>;
}
