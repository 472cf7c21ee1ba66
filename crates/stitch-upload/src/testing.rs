//! Store wrappers used to inject faults and interleavings in tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use stitch_store::{
    BlobMeta, BlobReader, BlobStore, BlobWriter, InMemoryBlobStore, StoreError, StoreResult,
};

/// In-memory store whose streaming writers can fail or yield on demand.
#[derive(Clone)]
pub(crate) struct FaultyStore {
    inner: InMemoryBlobStore,
    fail_write_at: Arc<Mutex<Option<usize>>>,
    yield_on_write: bool,
}

impl FaultyStore {
    pub(crate) fn new(inner: InMemoryBlobStore) -> Self {
        Self {
            inner,
            fail_write_at: Arc::new(Mutex::new(None)),
            yield_on_write: false,
        }
    }

    /// Make the `n`th (zero-based) write of every new stream fail.
    pub(crate) fn fail_write_at(self, n: usize) -> Self {
        *self.fail_write_at.lock().unwrap() = Some(n);
        self
    }

    /// Yield to the scheduler before every streamed write.
    pub(crate) fn yield_on_write(mut self) -> Self {
        self.yield_on_write = true;
        self
    }

    /// Stop injecting failures.
    pub(crate) fn heal(&self) {
        *self.fail_write_at.lock().unwrap() = None;
    }
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<u64> {
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn open(&self, key: &str) -> StoreResult<Option<BlobReader>> {
        self.inner.open(key).await
    }

    async fn stat(&self, key: &str) -> StoreResult<Option<BlobMeta>> {
        self.inner.stat(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }

    async fn list(&self) -> StoreResult<Vec<BlobMeta>> {
        self.inner.list().await
    }

    async fn put_stream(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>> {
        Ok(Box::new(FaultyWriter {
            inner: self.inner.put_stream(key).await?,
            writes: 0,
            fail_at: *self.fail_write_at.lock().unwrap(),
            yield_on_write: self.yield_on_write,
        }))
    }
}

struct FaultyWriter {
    inner: Box<dyn BlobWriter>,
    writes: usize,
    fail_at: Option<usize>,
    yield_on_write: bool,
}

#[async_trait]
impl BlobWriter for FaultyWriter {
    async fn write(&mut self, data: Bytes) -> StoreResult<()> {
        if self.yield_on_write {
            tokio::task::yield_now().await;
        }
        if self.fail_at == Some(self.writes) {
            return Err(StoreError::Io(std::io::Error::other("injected write failure")));
        }
        self.writes += 1;
        self.inner.write(data).await
    }

    async fn finish(self: Box<Self>) -> StoreResult<u64> {
        self.inner.finish().await
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        self.inner.abort().await
    }
}
