use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use stitch_store::BlobStore;
use stitch_types::{ArtifactName, ChunkIndex, ChunkKey, SessionKey};
use tracing::{debug, info, warn};

use crate::api::MergeSpec;
use crate::config::{CollisionPolicy, UploadConfig};
use crate::error::{UploadError, UploadResult};
use crate::session::SessionRegistry;
use crate::tracker::scan_staged;

/// A finished artifact produced by [`Merger::merge`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergedArtifact {
    pub filename: ArtifactName,
    pub size: u64,
    pub locator: String,
}

/// Sessions and target filenames with a merge currently running.
#[derive(Default)]
struct InFlight {
    sessions: HashSet<SessionKey>,
    targets: HashSet<ArtifactName>,
}

/// Exclusive claim on a session (and optionally a target filename).
///
/// Released on drop, whichever way the holder exits.
pub struct SessionGuard<'a> {
    in_flight: &'a Mutex<InFlight>,
    session: SessionKey,
    target: Option<ArtifactName>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        set.sessions.remove(&self.session);
        if let Some(target) = &self.target {
            set.targets.remove(target);
        }
    }
}

/// Verifies a session is complete and concatenates its chunks in index order.
///
/// At most one merge per session runs at a time; a concurrent call for the
/// same session, or for the same target filename, is rejected with
/// `Conflict`. Merges of unrelated sessions run in parallel.
pub struct Merger {
    staging: Arc<dyn BlobStore>,
    artifacts: Arc<dyn BlobStore>,
    registry: Arc<SessionRegistry>,
    config: UploadConfig,
    in_flight: Mutex<InFlight>,
}

impl Merger {
    pub fn new(
        staging: Arc<dyn BlobStore>,
        artifacts: Arc<dyn BlobStore>,
        registry: Arc<SessionRegistry>,
        config: UploadConfig,
    ) -> Self {
        Self {
            staging,
            artifacts,
            registry,
            config,
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    /// Claim `session` (and `target`, if given) for exclusive use.
    pub fn claim(
        &self,
        session: &SessionKey,
        target: Option<&ArtifactName>,
    ) -> UploadResult<SessionGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if set.sessions.contains(session) {
            return Err(UploadError::Conflict(format!("session {session}")));
        }
        if let Some(target) = target {
            if set.targets.contains(target) {
                return Err(UploadError::Conflict(format!("artifact {target}")));
            }
            set.targets.insert(target.clone());
        }
        set.sessions.insert(session.clone());
        Ok(SessionGuard {
            in_flight: &self.in_flight,
            session: session.clone(),
            target: target.cloned(),
        })
    }

    /// Merge all chunks of a session into one artifact.
    ///
    /// Nothing is written unless every index in `0..total_chunks` is staged
    /// with a non-empty chunk. If concatenation fails, the partial artifact is
    /// discarded and the staged chunks are kept for a retry. Staged chunks are
    /// removed only after the artifact is in place; failures to remove them
    /// are logged and do not fail the merge.
    pub async fn merge(&self, spec: &MergeSpec) -> UploadResult<MergedArtifact> {
        let _guard = self.claim(&spec.session, Some(&spec.filename))?;
        info!(
            hash = %spec.session,
            filename = %spec.filename,
            total = spec.total_chunks,
            "merge started"
        );

        if self.config.collision_policy == CollisionPolicy::Reject
            && self.artifacts.exists(spec.filename.as_str()).await?
        {
            return Err(UploadError::AlreadyExists(spec.filename.to_string()));
        }

        let keys = self.check_complete(spec).await?;
        let size = self.concatenate(spec, &keys).await?;
        self.remove_chunks(&keys).await;
        self.registry.mark_merged(&spec.session, &spec.filename);

        info!(hash = %spec.session, filename = %spec.filename, size, "merge finished");
        Ok(MergedArtifact {
            filename: spec.filename.clone(),
            size,
            locator: self.config.locator(&spec.filename),
        })
    }

    /// Completeness gate. Returns the staging keys in index order.
    ///
    /// One prefix scan decides presence; a chunk that vanishes afterwards is
    /// caught when concatenation reads it.
    async fn check_complete(&self, spec: &MergeSpec) -> UploadResult<Vec<String>> {
        let present: BTreeSet<ChunkIndex> = scan_staged(self.staging.as_ref(), &spec.session)
            .await?
            .into_iter()
            .map(|(index, _)| index)
            .collect();
        let missing: Vec<u32> = (0..spec.total_chunks)
            .filter(|i| !present.contains(&ChunkIndex::new(*i)))
            .collect();
        debug!(
            hash = %spec.session,
            present = spec.total_chunks as usize - missing.len(),
            missing = missing.len(),
            "completeness gate"
        );
        if !missing.is_empty() {
            warn!(
                hash = %spec.session,
                missing = missing.len(),
                first = missing[0],
                "merge refused: chunks missing"
            );
            return Err(UploadError::MissingChunks(missing));
        }
        Ok((0..spec.total_chunks)
            .map(|i| ChunkKey::new(spec.session.clone(), ChunkIndex::new(i)).to_string())
            .collect())
    }

    /// Stream chunks into the artifact strictly in ascending index order.
    async fn concatenate(&self, spec: &MergeSpec, keys: &[String]) -> UploadResult<u64> {
        let mut writer = self.artifacts.put_stream(spec.filename.as_str()).await?;
        for (index, key) in keys.iter().enumerate() {
            let step = match self.staging.get(key).await {
                Ok(Some(data)) if !data.is_empty() => writer
                    .write(data)
                    .await
                    .map_err(|e| format!("writing chunk {index}: {e}")),
                Ok(_) => Err(format!("chunk {index} disappeared during merge")),
                Err(e) => Err(format!("reading chunk {index}: {e}")),
            };
            if let Err(reason) = step {
                if let Err(e) = writer.abort().await {
                    warn!(filename = %spec.filename, error = %e, "failed to discard partial artifact");
                }
                warn!(hash = %spec.session, %reason, "merge aborted");
                return Err(UploadError::MergeFailed(reason));
            }
        }
        writer
            .finish()
            .await
            .map_err(|e| UploadError::MergeFailed(format!("finalizing {}: {e}", spec.filename)))
    }

    async fn remove_chunks(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.staging.delete(key).await {
                warn!(%key, error = %e, "failed to remove staged chunk after merge");
            }
        }
    }
}
