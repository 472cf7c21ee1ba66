use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stitch_upload::UploadConfig;

use crate::error::{ServerError, ServerResult};

/// Server settings. Every field has a default, so a partial TOML file is valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Where chunks are staged as `<hash>-<index>`.
    pub staging_dir: PathBuf,
    /// Where merged artifacts land.
    pub artifacts_dir: PathBuf,
    /// Request body limit for the chunk endpoint.
    pub max_chunk_bytes: usize,
    pub upload: UploadConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            staging_dir: PathBuf::from("./temp"),
            artifacts_dir: PathBuf::from("./uploads"),
            max_chunk_bytes: 64 * 1024 * 1024,
            upload: UploadConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> ServerResult<Self> {
        toml::from_str(raw).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Point both stores below one data directory.
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.staging_dir = dir.join("temp");
        self.artifacts_dir = dir.join("uploads");
        self
    }
}
