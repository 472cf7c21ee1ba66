use serde::{Deserialize, Serialize};
use stitch_types::ArtifactName;

/// Default upper bound on `totalChunks` accepted from a client.
pub const DEFAULT_MAX_TOTAL_CHUNKS: u32 = 100_000;

/// What a merge does when its target filename already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Fail with `AlreadyExists` before anything is written.
    #[default]
    Reject,
    /// Atomically replace the existing artifact.
    Overwrite,
}

/// Behavior knobs of the upload core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub collision_policy: CollisionPolicy,
    /// Path prefix under which finished artifacts are served.
    pub locator_prefix: String,
    /// Largest `totalChunks` a stage or merge request may announce.
    pub max_total_chunks: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            collision_policy: CollisionPolicy::Reject,
            locator_prefix: "/files".into(),
            max_total_chunks: DEFAULT_MAX_TOTAL_CHUNKS,
        }
    }
}

impl UploadConfig {
    /// Public locator of an artifact, e.g. `/files/video.mp4`.
    pub fn locator(&self, name: &ArtifactName) -> String {
        format!("{}/{}", self.locator_prefix.trim_end_matches('/'), name)
    }
}
