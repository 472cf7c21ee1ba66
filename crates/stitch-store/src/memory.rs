use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::traits::{BlobMeta, BlobReader, BlobStore, BlobWriter};
use crate::validate_key;

#[derive(Clone)]
struct Entry {
    data: Bytes,
    modified: DateTime<Utc>,
}

type Blobs = Arc<RwLock<HashMap<String, Entry>>>;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. All blobs are held in memory behind a
/// `RwLock` for safe concurrent access. `Bytes` makes reads cheap clones.
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Blobs,
}

impl InMemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all keys in the store.
    pub fn keys(&self) -> Vec<String> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn meta(key: &str, entry: &Entry) -> BlobMeta {
        BlobMeta {
            key: key.to_string(),
            size: entry.data.len() as u64,
            modified: entry.modified,
        }
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<u64> {
        validate_key(key)?;
        let size = data.len() as u64;
        let entry = Entry {
            data,
            modified: Utc::now(),
        };
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), entry);
        Ok(size)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        validate_key(key)?;
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(key).map(|e| e.data.clone()))
    }

    async fn open(&self, key: &str) -> StoreResult<Option<BlobReader>> {
        Ok(self
            .get(key)
            .await?
            .map(|data| Box::pin(Cursor::new(data)) as BlobReader))
    }

    async fn stat(&self, key: &str) -> StoreResult<Option<BlobMeta>> {
        validate_key(key)?;
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(key).map(|e| Self::meta(key, e)))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let mut map = self.blobs.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<BlobMeta>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.iter().map(|(k, e)| Self::meta(k, e)).collect())
    }

    async fn put_stream(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>> {
        validate_key(key)?;
        Ok(Box::new(MemoryWriter {
            blobs: Arc::clone(&self.blobs),
            key: key.to_string(),
            buf: BytesMut::new(),
        }))
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}

/// Buffers the whole blob and inserts it in one step on `finish`.
struct MemoryWriter {
    blobs: Blobs,
    key: String,
    buf: BytesMut,
}

#[async_trait]
impl BlobWriter for MemoryWriter {
    async fn write(&mut self, data: Bytes) -> StoreResult<()> {
        self.buf.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StoreResult<u64> {
        let MemoryWriter { blobs, key, buf } = *self;
        let size = buf.len() as u64;
        let entry = Entry {
            data: buf.freeze(),
            modified: Utc::now(),
        };
        blobs.write().expect("lock poisoned").insert(key, entry);
        Ok(size)
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
