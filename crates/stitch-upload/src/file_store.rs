use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stitch_store::{BlobMeta, BlobReader, BlobStore};
use stitch_types::ArtifactName;

use crate::config::UploadConfig;
use crate::error::{UploadError, UploadResult};

/// Listing entry for one finished artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub name: String,
    pub size: u64,
    pub modified_time: DateTime<Utc>,
    pub locator: String,
}

/// Read-only access to finished artifacts.
pub struct FileStore {
    artifacts: Arc<dyn BlobStore>,
    config: UploadConfig,
}

impl FileStore {
    pub fn new(artifacts: Arc<dyn BlobStore>, config: UploadConfig) -> Self {
        Self { artifacts, config }
    }

    fn info(&self, name: &ArtifactName, meta: &BlobMeta) -> ArtifactInfo {
        ArtifactInfo {
            name: name.to_string(),
            size: meta.size,
            modified_time: meta.modified,
            locator: self.config.locator(name),
        }
    }

    fn name(filename: &str) -> UploadResult<ArtifactName> {
        if filename.is_empty() {
            return Err(UploadError::missing("filename"));
        }
        ArtifactName::new(filename).map_err(|e| UploadError::malformed("filename", e))
    }

    /// All artifacts, sorted by name.
    ///
    /// Entries whose key is not a valid artifact name are skipped.
    pub async fn list_artifacts(&self) -> UploadResult<Vec<ArtifactInfo>> {
        let mut out: Vec<ArtifactInfo> = self
            .artifacts
            .list()
            .await?
            .iter()
            .filter_map(|meta| {
                let name = ArtifactName::new(meta.key.as_str()).ok()?;
                Some(self.info(&name, meta))
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Metadata of one artifact.
    pub async fn stat_artifact(&self, filename: &str) -> UploadResult<ArtifactInfo> {
        let name = Self::name(filename)?;
        let meta = self
            .artifacts
            .stat(name.as_str())
            .await?
            .ok_or_else(|| UploadError::NotFound(filename.to_string()))?;
        Ok(self.info(&name, &meta))
    }

    /// Open an artifact as a byte stream.
    pub async fn get_artifact(&self, filename: &str) -> UploadResult<BlobReader> {
        let name = Self::name(filename)?;
        self.artifacts
            .open(name.as_str())
            .await?
            .ok_or_else(|| UploadError::NotFound(filename.to_string()))
    }

    /// Read a whole artifact into memory.
    pub async fn read_artifact(&self, filename: &str) -> UploadResult<Bytes> {
        let name = Self::name(filename)?;
        self.artifacts
            .get(name.as_str())
            .await?
            .ok_or_else(|| UploadError::NotFound(filename.to_string()))
    }
}
