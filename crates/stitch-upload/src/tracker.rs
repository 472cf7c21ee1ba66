use std::sync::Arc;

use stitch_store::BlobStore;
use stitch_types::{ChunkIndex, ChunkKey, SessionKey};
use tracing::debug;

use crate::error::UploadResult;
use crate::session::{SessionRegistry, UploadSession};

/// Reports which chunk indices of a session are currently staged.
///
/// The staging store decides which chunks exist: every query scans the
/// session's key prefix and reconciles the [`SessionRegistry`] entry with the
/// result, so chunks written by another process or before a restart are
/// never hidden. The registry contributes what the store cannot tell (target
/// filename, announced chunk count, merge tombstone). Results are advisory:
/// the merge gate re-checks the store itself.
pub struct UploadStatusTracker {
    staging: Arc<dyn BlobStore>,
    registry: Arc<SessionRegistry>,
}

impl UploadStatusTracker {
    pub fn new(staging: Arc<dyn BlobStore>, registry: Arc<SessionRegistry>) -> Self {
        Self { staging, registry }
    }

    /// Staged indices of `session`, ascending.
    pub async fn list_staged_chunks(&self, session: &SessionKey) -> UploadResult<Vec<u32>> {
        Ok(self.session(session).await?.staged_indices())
    }

    /// Current view of a session, reconciled with the staging store.
    pub async fn session(&self, session: &SessionKey) -> UploadResult<UploadSession> {
        let scanned = self.scan(session).await?;
        if !self.registry.contains(session) {
            debug!(hash = %session, recovered = scanned.len(), "session recovered from staging scan");
        }
        Ok(self.registry.reconcile(session, scanned))
    }

    /// Scan the staging store for non-empty chunks of `session`.
    ///
    /// Entries whose suffix is not a canonical index are ignored.
    pub async fn scan(&self, session: &SessionKey) -> UploadResult<Vec<(ChunkIndex, u64)>> {
        scan_staged(self.staging.as_ref(), session).await
    }
}

/// Non-empty chunks of `session` with their sizes, in ascending index order.
pub(crate) async fn scan_staged(
    staging: &dyn BlobStore,
    session: &SessionKey,
) -> UploadResult<Vec<(ChunkIndex, u64)>> {
    let mut found: Vec<_> = staging
        .list_prefix(&session.chunk_prefix())
        .await?
        .into_iter()
        .filter(|meta| meta.size > 0)
        .filter_map(|meta| ChunkKey::index_for(session, &meta.key).map(|i| (i, meta.size)))
        .collect();
    found.sort_unstable();
    Ok(found)
}
