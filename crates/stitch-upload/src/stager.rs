use std::sync::Arc;

use serde::Serialize;
use stitch_store::BlobStore;
use stitch_types::ChunkKey;
use tracing::{debug, warn};

use crate::api::ChunkUpload;
use crate::error::{UploadError, UploadResult};
use crate::session::SessionRegistry;

/// Outcome of staging one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StagedChunk {
    pub index: u32,
    pub size: u64,
}

/// Persists individual chunks under their `"<hash>-<index>"` staging key.
///
/// Writes for distinct keys are independent and may run in parallel.
/// Resending an index replaces its bytes (last write wins).
pub struct ChunkStager {
    staging: Arc<dyn BlobStore>,
    registry: Arc<SessionRegistry>,
}

impl ChunkStager {
    pub fn new(staging: Arc<dyn BlobStore>, registry: Arc<SessionRegistry>) -> Self {
        Self { staging, registry }
    }

    /// Store one validated chunk.
    ///
    /// The backend write is atomic, so a failed call leaves either the
    /// previous chunk or nothing under the key. A chunk that reads back as
    /// zero bytes is removed again and reported as `EmptyChunk`.
    pub async fn stage(&self, upload: ChunkUpload) -> UploadResult<StagedChunk> {
        let key = ChunkKey::new(upload.session.clone(), upload.index);
        let storage_key = key.to_string();

        self.staging.put(&storage_key, upload.data).await?;
        let size = self
            .staging
            .stat(&storage_key)
            .await?
            .map(|meta| meta.size)
            .unwrap_or(0);

        if size == 0 {
            if let Err(e) = self.staging.delete(&storage_key).await {
                warn!(key = %storage_key, error = %e, "failed to remove empty chunk");
            }
            self.registry.forget_chunk(&upload.session, upload.index);
            warn!(hash = %upload.session, index = upload.index.get(), "rejected empty chunk");
            return Err(UploadError::EmptyChunk {
                index: upload.index.get(),
            });
        }

        self.registry.record_chunk(
            &upload.session,
            upload.index,
            size,
            &upload.filename,
            upload.total_chunks,
        );
        debug!(
            hash = %upload.session,
            index = upload.index.get(),
            total = upload.total_chunks,
            size,
            "chunk staged"
        );
        Ok(StagedChunk {
            index: upload.index.get(),
            size,
        })
    }
}
