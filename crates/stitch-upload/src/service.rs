use std::path::Path;
use std::sync::Arc;

use stitch_store::{BlobReader, BlobStore, FsBlobStore, InMemoryBlobStore};
use stitch_types::{ChunkKey, SessionKey};
use tracing::{info, warn};

use crate::api::{
    MergeRequest, MergeResponse, StageChunkRequest, StageChunkResponse, StatusRequest,
    StatusResponse,
};
use crate::config::UploadConfig;
use crate::error::{UploadError, UploadResult};
use crate::file_store::{ArtifactInfo, FileStore};
use crate::merger::Merger;
use crate::session::{SessionRegistry, SessionSnapshot};
use crate::stager::ChunkStager;
use crate::tracker::UploadStatusTracker;

/// Entry point wiring the stager, tracker, merger and file store together
/// over one staging store and one artifact store.
pub struct UploadService {
    staging: Arc<dyn BlobStore>,
    registry: Arc<SessionRegistry>,
    stager: ChunkStager,
    tracker: UploadStatusTracker,
    merger: Merger,
    files: FileStore,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        staging: Arc<dyn BlobStore>,
        artifacts: Arc<dyn BlobStore>,
        config: UploadConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            stager: ChunkStager::new(Arc::clone(&staging), Arc::clone(&registry)),
            tracker: UploadStatusTracker::new(Arc::clone(&staging), Arc::clone(&registry)),
            merger: Merger::new(
                Arc::clone(&staging),
                Arc::clone(&artifacts),
                Arc::clone(&registry),
                config.clone(),
            ),
            files: FileStore::new(artifacts, config.clone()),
            staging,
            registry,
            config,
        }
    }

    /// Service over two fresh in-memory stores.
    pub fn in_memory(config: UploadConfig) -> Self {
        Self::new(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            config,
        )
    }

    /// Service over two directories, created if missing.
    pub async fn open_dirs(
        staging_dir: impl AsRef<Path>,
        artifacts_dir: impl AsRef<Path>,
        config: UploadConfig,
    ) -> UploadResult<Self> {
        let staging = FsBlobStore::open(staging_dir).await?;
        let artifacts = FsBlobStore::open(artifacts_dir).await?;
        Ok(Self::new(Arc::new(staging), Arc::new(artifacts), config))
    }

    pub fn stager(&self) -> &ChunkStager {
        &self.stager
    }

    pub fn tracker(&self) -> &UploadStatusTracker {
        &self.tracker
    }

    pub fn merger(&self) -> &Merger {
        &self.merger
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    // ---- Request-level operations ----

    pub async fn check_status(&self, req: &StatusRequest) -> UploadResult<StatusResponse> {
        let session = req.validate()?;
        Ok(StatusResponse {
            uploaded_chunks: self.tracker.list_staged_chunks(&session).await?,
        })
    }

    pub async fn stage_chunk(&self, req: StageChunkRequest) -> UploadResult<StageChunkResponse> {
        let upload = req.validate_within(self.config.max_total_chunks)?;
        let staged = self.stager.stage(upload).await?;
        Ok(StageChunkResponse {
            success: true,
            index: staged.index,
            size: staged.size,
        })
    }

    pub async fn merge(&self, req: &MergeRequest) -> UploadResult<MergeResponse> {
        let spec = req.validate_within(self.config.max_total_chunks)?;
        let merged = self.merger.merge(&spec).await?;
        Ok(MergeResponse {
            success: true,
            filename: merged.filename.to_string(),
            size: merged.size,
            locator: merged.locator,
        })
    }

    pub async fn list_files(&self) -> UploadResult<Vec<ArtifactInfo>> {
        self.files.list_artifacts().await
    }

    pub async fn open_file(&self, filename: &str) -> UploadResult<BlobReader> {
        self.files.get_artifact(filename).await
    }

    // ---- Session management ----

    /// Snapshot of one session, or `None` if nothing is known about it.
    pub async fn session(&self, hash: &str) -> UploadResult<Option<SessionSnapshot>> {
        let key = parse_hash(hash)?;
        let session = self.tracker.session(&key).await?;
        if session.chunks.is_empty() && session.merged_into.is_none() {
            self.registry.remove(&key);
            return Ok(None);
        }
        Ok(Some(SessionSnapshot::from(&session)))
    }

    /// Delete every staged chunk of a session. Returns how many were removed.
    ///
    /// Fails with `Conflict` while a merge of the session is running.
    pub async fn discard(&self, hash: &str) -> UploadResult<usize> {
        let key = parse_hash(hash)?;
        let _guard = self.merger.claim(&key, None)?;
        let mut removed = 0;
        for (index, _) in self.tracker.scan(&key).await? {
            let chunk = ChunkKey::new(key.clone(), index).to_string();
            match self.staging.delete(&chunk).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %chunk, error = %e, "failed to discard chunk");
                    return Err(e.into());
                }
            }
        }
        self.registry.remove(&key);
        info!(hash = %key, removed, "session discarded");
        Ok(removed)
    }
}

fn parse_hash(hash: &str) -> UploadResult<SessionKey> {
    StatusRequest {
        hash: Some(hash.to_string()),
    }
    .validate()
}

impl std::fmt::Debug for UploadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadService")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RawNumber;
    use crate::session::SessionState;
    use bytes::Bytes;
    use proptest::prelude::*;
    use tokio::io::AsyncReadExt;

    fn chunk(hash: &str, index: u32, total: u32, data: &[u8]) -> StageChunkRequest {
        StageChunkRequest {
            hash: Some(hash.into()),
            chunk_index: Some(index.to_string()),
            total_chunks: Some(RawNumber::from(total)),
            filename: Some("video.mp4".into()),
            chunk: Some(Bytes::copy_from_slice(data)),
        }
    }

    fn merge_req(hash: &str, filename: &str, total: u32) -> MergeRequest {
        MergeRequest {
            hash: Some(hash.into()),
            filename: Some(filename.into()),
            total_chunks: Some(RawNumber::from(total)),
        }
    }

    fn status(hash: &str) -> StatusRequest {
        StatusRequest {
            hash: Some(hash.into()),
        }
    }

    async fn read_all(mut reader: BlobReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn out_of_order_upload_then_merge() {
        let svc = UploadService::in_memory(UploadConfig::default());
        let c0 = b"AAAA";
        let c1 = b"BBBBB";
        let c2 = b"CCCCCC";

        assert_eq!(svc.stage_chunk(chunk("abc123", 1, 3, c1)).await.unwrap().size, 5);
        assert_eq!(svc.stage_chunk(chunk("abc123", 0, 3, c0)).await.unwrap().size, 4);
        assert_eq!(svc.stage_chunk(chunk("abc123", 2, 3, c2)).await.unwrap().size, 6);

        let st = svc.check_status(&status("abc123")).await.unwrap();
        assert_eq!(st.uploaded_chunks, vec![0, 1, 2]);

        let merged = svc.merge(&merge_req("abc123", "video.mp4", 3)).await.unwrap();
        assert!(merged.success);
        assert_eq!(merged.size, 15);
        assert_eq!(merged.locator, "/files/video.mp4");

        let bytes = read_all(svc.open_file("video.mp4").await.unwrap()).await;
        assert_eq!(bytes, [&c0[..], &c1[..], &c2[..]].concat());

        assert!(svc.check_status(&status("abc123")).await.unwrap().uploaded_chunks.is_empty());
        let files = svc.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 15);
    }

    #[tokio::test]
    async fn resumes_after_partial_upload() {
        let svc = UploadService::in_memory(UploadConfig::default());
        svc.stage_chunk(chunk("h", 0, 3, b"one")).await.unwrap();
        svc.stage_chunk(chunk("h", 2, 3, b"three")).await.unwrap();

        let err = svc.merge(&merge_req("h", "f.bin", 3)).await.unwrap_err();
        assert!(matches!(err, UploadError::MissingChunks(ref m) if m == &vec![1]));
        assert!(svc.list_files().await.unwrap().is_empty());

        let st = svc.check_status(&status("h")).await.unwrap();
        assert_eq!(st.uploaded_chunks, vec![0, 2]);
        svc.stage_chunk(chunk("h", 1, 3, b"two")).await.unwrap();

        let merged = svc.merge(&merge_req("h", "f.bin", 3)).await.unwrap();
        assert_eq!(merged.size, 11);
    }

    #[tokio::test]
    async fn overwritten_chunk_is_what_gets_merged() {
        let svc = UploadService::in_memory(UploadConfig::default());
        svc.stage_chunk(chunk("h", 0, 2, b"stale")).await.unwrap();
        svc.stage_chunk(chunk("h", 1, 2, b"-tail")).await.unwrap();
        svc.stage_chunk(chunk("h", 0, 2, b"fresh")).await.unwrap();
        svc.merge(&merge_req("h", "f.bin", 2)).await.unwrap();
        let bytes = svc.files().read_artifact("f.bin").await.unwrap();
        assert_eq!(bytes, "fresh-tail");
    }

    #[tokio::test]
    async fn empty_chunk_leaves_no_entry() {
        let svc = UploadService::in_memory(UploadConfig::default());
        let err = svc.stage_chunk(chunk("h", 0, 1, b"")).await.unwrap_err();
        assert!(matches!(err, UploadError::EmptyChunk { index: 0 }));
        assert!(svc.check_status(&status("h")).await.unwrap().uploaded_chunks.is_empty());
    }

    #[tokio::test]
    async fn session_snapshot_tracks_state() {
        let svc = UploadService::in_memory(UploadConfig::default());
        assert!(svc.session("h").await.unwrap().is_none());

        svc.stage_chunk(chunk("h", 0, 2, b"ab")).await.unwrap();
        let snap = svc.session("h").await.unwrap().unwrap();
        assert_eq!(snap.state, SessionState::Partial);
        assert_eq!(snap.filename.as_deref(), Some("video.mp4"));

        svc.stage_chunk(chunk("h", 1, 2, b"cd")).await.unwrap();
        assert_eq!(svc.session("h").await.unwrap().unwrap().state, SessionState::Ready);

        svc.merge(&merge_req("h", "video.mp4", 2)).await.unwrap();
        let snap = svc.session("h").await.unwrap().unwrap();
        assert_eq!(snap.state, SessionState::Merged);
        assert_eq!(snap.merged_into.as_deref(), Some("video.mp4"));
    }

    #[tokio::test]
    async fn discard_removes_staged_chunks() {
        let svc = UploadService::in_memory(UploadConfig::default());
        svc.stage_chunk(chunk("h", 0, 3, b"a")).await.unwrap();
        svc.stage_chunk(chunk("h", 1, 3, b"b")).await.unwrap();
        svc.stage_chunk(chunk("keep", 0, 1, b"c")).await.unwrap();

        assert_eq!(svc.discard("h").await.unwrap(), 2);
        assert!(svc.check_status(&status("h")).await.unwrap().uploaded_chunks.is_empty());
        assert_eq!(svc.check_status(&status("keep")).await.unwrap().uploaded_chunks, vec![0]);
    }

    #[tokio::test]
    async fn oversized_chunk_count_is_rejected_up_front() {
        let config = UploadConfig {
            max_total_chunks: 8,
            ..UploadConfig::default()
        };
        let svc = UploadService::in_memory(config);
        let err = svc.merge(&merge_req("h", "f.bin", 5_000_000)).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument { field: "totalChunks", .. }));
        let err = svc.stage_chunk(chunk("h", 0, 9, b"x")).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument { field: "totalChunks", .. }));
        assert!(svc.stage_chunk(chunk("h", 0, 8, b"x")).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_status_request() {
        let svc = UploadService::in_memory(UploadConfig::default());
        let err = svc.check_status(&StatusRequest::default()).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument { field: "hash", .. }));
    }

    #[tokio::test]
    async fn filesystem_backed_roundtrip_and_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("temp");
        let uploads = dir.path().join("uploads");

        {
            let svc = UploadService::open_dirs(&staging, &uploads, UploadConfig::default())
                .await
                .unwrap();
            svc.stage_chunk(chunk("abc123", 2, 3, b"CCCCCC")).await.unwrap();
            svc.stage_chunk(chunk("abc123", 0, 3, b"AAAA")).await.unwrap();
        }

        // A fresh service has an empty registry and recovers from disk.
        let svc = UploadService::open_dirs(&staging, &uploads, UploadConfig::default())
            .await
            .unwrap();
        let st = svc.check_status(&status("abc123")).await.unwrap();
        assert_eq!(st.uploaded_chunks, vec![0, 2]);

        svc.stage_chunk(chunk("abc123", 1, 3, b"BBBBB")).await.unwrap();
        let merged = svc.merge(&merge_req("abc123", "video.mp4", 3)).await.unwrap();
        assert_eq!(merged.size, 15);
        assert_eq!(
            std::fs::read(uploads.join("video.mp4")).unwrap(),
            b"AAAABBBBBCCCCCC"
        );
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn restaging_after_restart_keeps_chunks_on_disk_visible() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("temp");
        let uploads = dir.path().join("uploads");
        {
            let svc = UploadService::open_dirs(&staging, &uploads, UploadConfig::default())
                .await
                .unwrap();
            svc.stage_chunk(chunk("abc123", 0, 3, b"AAAA")).await.unwrap();
            svc.stage_chunk(chunk("abc123", 2, 3, b"CCCCCC")).await.unwrap();
        }

        let svc = UploadService::open_dirs(&staging, &uploads, UploadConfig::default())
            .await
            .unwrap();
        // First contact with the session after the restart is a stage, not a status query.
        svc.stage_chunk(chunk("abc123", 1, 3, b"BBBBB")).await.unwrap();
        let st = svc.check_status(&status("abc123")).await.unwrap();
        assert_eq!(st.uploaded_chunks, vec![0, 1, 2]);
        let snap = svc.session("abc123").await.unwrap().unwrap();
        assert_eq!(snap.state, SessionState::Ready);
        assert_eq!(snap.staged_bytes, 15);
    }

    #[tokio::test]
    async fn services_sharing_directories_see_each_others_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("temp");
        let uploads = dir.path().join("uploads");
        let a = UploadService::open_dirs(&staging, &uploads, UploadConfig::default())
            .await
            .unwrap();
        let b = UploadService::open_dirs(&staging, &uploads, UploadConfig::default())
            .await
            .unwrap();

        a.stage_chunk(chunk("shared", 0, 2, b"left")).await.unwrap();
        assert_eq!(a.check_status(&status("shared")).await.unwrap().uploaded_chunks, vec![0]);
        b.stage_chunk(chunk("shared", 1, 2, b"right")).await.unwrap();
        assert_eq!(
            a.check_status(&status("shared")).await.unwrap().uploaded_chunks,
            vec![0, 1]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn staging_order_does_not_matter(order in Just((0u32..12).collect::<Vec<_>>()).prop_shuffle()) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let svc = UploadService::in_memory(UploadConfig::default());
                let n = order.len() as u32;
                for &i in &order {
                    let data = vec![i as u8; i as usize + 1];
                    svc.stage_chunk(chunk("perm", i, n, &data)).await.unwrap();
                }
                let st = svc.check_status(&status("perm")).await.unwrap();
                assert_eq!(st.uploaded_chunks, (0..n).collect::<Vec<_>>());

                let merged = svc.merge(&merge_req("perm", "perm.bin", n)).await.unwrap();
                let expected: Vec<u8> = (0..n).flat_map(|i| vec![i as u8; i as usize + 1]).collect();
                assert_eq!(merged.size, expected.len() as u64);
                let bytes = svc.files().read_artifact("perm.bin").await.unwrap();
                assert_eq!(bytes, expected);
            });
        }
    }
}
