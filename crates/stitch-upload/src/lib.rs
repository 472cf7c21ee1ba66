//! Resumable chunked uploads.
//!
//! A client splits a file into indexed chunks, stages them in any order (and
//! as often as it likes), asks which indices are already staged, and finally
//! requests a merge that reassembles the chunks in strict index order.
//!
//! # Components
//!
//! - [`ChunkStager`]: writes one chunk under `"<hash>-<index>"`
//! - [`UploadStatusTracker`]: reports staged indices of a session
//! - [`Merger`]: completeness gate, ordered concatenation, cleanup
//! - [`FileStore`]: read path for finished artifacts
//! - [`UploadService`]: wires the above over a staging and an artifact store
//!
//! Sessions are tracked explicitly in a [`SessionRegistry`]; a session the
//! registry does not know is recovered from the staging store on demand.

pub mod api;
pub mod config;
pub mod error;
pub mod file_store;
pub mod merger;
pub mod service;
pub mod session;
pub mod stager;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use api::{
    ChunkUpload, MergeRequest, MergeResponse, MergeSpec, RawNumber, StageChunkRequest,
    StageChunkResponse, StatusRequest, StatusResponse,
};
pub use config::{CollisionPolicy, UploadConfig};
pub use error::{ArgumentProblem, UploadError, UploadResult};
pub use file_store::{ArtifactInfo, FileStore};
pub use merger::{MergedArtifact, Merger, SessionGuard};
pub use service::UploadService;
pub use session::{SessionRegistry, SessionSnapshot, SessionState, UploadSession};
pub use stager::{ChunkStager, StagedChunk};
pub use tracker::UploadStatusTracker;
