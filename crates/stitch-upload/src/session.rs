//! Explicit per-session index of staged chunks.
//!
//! The registry is updated on every stage, merge and discard. It remembers
//! what a bare staging listing cannot: the announced filename and chunk
//! count, and which artifact a session was merged into. Status queries
//! reconcile the staged chunk set with a staging scan, so a session unknown
//! to the registry (e.g. after a restart) is rebuilt on demand.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stitch_types::{ArtifactName, ChunkIndex, SessionKey};
use tracing::warn;

/// Lifecycle position of a session, derived from its staged chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing staged.
    Empty,
    /// Some chunks staged, or the chunk count is not yet known.
    Partial,
    /// Every index in `0..total_chunks` is staged; a merge can pass the gate.
    Ready,
    /// Chunks were concatenated into an artifact and removed from staging.
    Merged,
}

/// One upload attempt, keyed by its client-supplied hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    pub key: SessionKey,
    /// Target filename as last announced by a chunk. Unknown after recovery.
    pub filename: Option<ArtifactName>,
    /// Chunk count as last announced by a chunk. Unknown after recovery.
    pub total_chunks: Option<u32>,
    /// Staged chunk sizes by index.
    pub chunks: BTreeMap<ChunkIndex, u64>,
    /// Artifact produced by the last successful merge.
    pub merged_into: Option<ArtifactName>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            filename: None,
            total_chunks: None,
            chunks: BTreeMap::new(),
            merged_into: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Staged indices in ascending order.
    pub fn staged_indices(&self) -> Vec<u32> {
        self.chunks.keys().map(|i| i.get()).collect()
    }

    /// Sum of all staged chunk sizes.
    pub fn staged_bytes(&self) -> u64 {
        self.chunks.values().sum()
    }

    /// Indices in `0..total` that are not staged.
    pub fn missing(&self, total: u32) -> Vec<u32> {
        (0..total)
            .filter(|i| !self.chunks.contains_key(&ChunkIndex::new(*i)))
            .collect()
    }

    pub fn state(&self) -> SessionState {
        if self.chunks.is_empty() {
            return match self.merged_into {
                Some(_) => SessionState::Merged,
                None => SessionState::Empty,
            };
        }
        match self.total_chunks {
            Some(total) if self.missing(total).is_empty() => SessionState::Ready,
            _ => SessionState::Partial,
        }
    }

    fn record(&mut self, index: ChunkIndex, size: u64, filename: &ArtifactName, total: u32) {
        if let Some(previous) = self.total_chunks.filter(|t| *t != total) {
            warn!(
                hash = %self.key,
                previous,
                total,
                "chunk count changed within a session"
            );
        }
        self.merged_into = None;
        self.filename = Some(filename.clone());
        self.total_chunks = Some(total);
        self.chunks.insert(index, size);
        self.updated_at = Utc::now();
    }
}

/// Serializable view of a session for status displays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub hash: String,
    pub filename: Option<String>,
    pub total_chunks: Option<u32>,
    pub uploaded_chunks: Vec<u32>,
    pub staged_bytes: u64,
    pub state: SessionState,
    pub merged_into: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UploadSession> for SessionSnapshot {
    fn from(s: &UploadSession) -> Self {
        Self {
            hash: s.key.to_string(),
            filename: s.filename.as_ref().map(ToString::to_string),
            total_chunks: s.total_chunks,
            uploaded_chunks: s.staged_indices(),
            staged_bytes: s.staged_bytes(),
            state: s.state(),
            merged_into: s.merged_into.as_ref().map(ToString::to_string),
            updated_at: s.updated_at,
        }
    }
}

/// Thread-safe map from session key to [`UploadSession`].
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, UploadSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the session, if known.
    pub fn get(&self, key: &SessionKey) -> Option<UploadSession> {
        self.sessions
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.read().expect("lock poisoned").contains_key(key)
    }

    /// Number of sessions currently tracked.
    pub fn len(&self) -> usize {
        self.sessions.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a freshly staged chunk, creating the session if needed.
    pub fn record_chunk(
        &self,
        key: &SessionKey,
        index: ChunkIndex,
        size: u64,
        filename: &ArtifactName,
        total_chunks: u32,
    ) {
        let mut map = self.sessions.write().expect("lock poisoned");
        map.entry(key.clone())
            .or_insert_with(|| UploadSession::new(key.clone()))
            .record(index, size, filename, total_chunks);
    }

    /// Drop one index from a session (e.g. after a rejected empty chunk).
    pub fn forget_chunk(&self, key: &SessionKey, index: ChunkIndex) {
        let mut map = self.sessions.write().expect("lock poisoned");
        if let Some(session) = map.get_mut(key) {
            session.chunks.remove(&index);
            session.updated_at = Utc::now();
        }
    }

    /// Replace the staged chunk set of a session with a fresh staging scan,
    /// keeping filename, chunk count and merge tombstone. Returns the
    /// resulting session.
    pub fn reconcile(
        &self,
        key: &SessionKey,
        scanned: impl IntoIterator<Item = (ChunkIndex, u64)>,
    ) -> UploadSession {
        let mut map = self.sessions.write().expect("lock poisoned");
        let session = map
            .entry(key.clone())
            .or_insert_with(|| UploadSession::new(key.clone()));
        let scanned: BTreeMap<_, _> = scanned.into_iter().collect();
        if scanned != session.chunks {
            session.chunks = scanned;
            session.updated_at = Utc::now();
        }
        session.clone()
    }

    /// Clear the staged chunks of a merged session, keeping a tombstone.
    pub fn mark_merged(&self, key: &SessionKey, artifact: &ArtifactName) {
        let mut map = self.sessions.write().expect("lock poisoned");
        let session = map
            .entry(key.clone())
            .or_insert_with(|| UploadSession::new(key.clone()));
        session.chunks.clear();
        session.merged_into = Some(artifact.clone());
        session.updated_at = Utc::now();
    }

    /// Forget a session entirely.
    pub fn remove(&self, key: &SessionKey) -> Option<UploadSession> {
        self.sessions.write().expect("lock poisoned").remove(key)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("session_count", &self.len())
            .finish()
    }
}
