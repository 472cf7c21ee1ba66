//! Transport-neutral request and response contracts.
//!
//! Raw requests carry fields exactly as a client sent them (optional,
//! untyped). `validate` turns them into the typed inputs the components
//! accept, reporting which field is missing or malformed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use stitch_types::{parse_chunk_count, ArtifactName, ChunkIndex, SessionKey};

use crate::config::DEFAULT_MAX_TOTAL_CHUNKS;
use crate::error::{UploadError, UploadResult};

/// A numeric field that may arrive as a JSON number or a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(serde_json::Number),
    Text(String),
}

impl RawNumber {
    fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<u32> for RawNumber {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

fn present<'a>(field: &'static str, value: Option<&'a str>) -> UploadResult<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(UploadError::missing(field)),
    }
}

fn session_key(raw: Option<&str>) -> UploadResult<SessionKey> {
    let raw = present("hash", raw)?;
    if raw.trim().is_empty() {
        return Err(UploadError::malformed("hash", "blank"));
    }
    SessionKey::new(raw).map_err(|e| UploadError::malformed("hash", e))
}

fn artifact_name(raw: Option<&str>) -> UploadResult<ArtifactName> {
    let raw = present("filename", raw)?;
    ArtifactName::new(raw).map_err(|e| UploadError::malformed("filename", e))
}

fn chunk_count(raw: Option<&RawNumber>, max_total_chunks: u32) -> UploadResult<u32> {
    let text = raw.map(RawNumber::as_text);
    let text = present("totalChunks", text.as_deref())?;
    let total = parse_chunk_count(text).map_err(|e| UploadError::malformed("totalChunks", e))?;
    if total > max_total_chunks {
        return Err(UploadError::malformed(
            "totalChunks",
            format!("{total} exceeds the limit of {max_total_chunks} chunks"),
        ));
    }
    Ok(total)
}

// ---------------------------------------------------------------------------
// Status check
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusRequest {
    pub hash: Option<String>,
}

impl StatusRequest {
    pub fn validate(&self) -> UploadResult<SessionKey> {
        session_key(self.hash.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub uploaded_chunks: Vec<u32>,
}

// ---------------------------------------------------------------------------
// Stage chunk
// ---------------------------------------------------------------------------

/// One chunk as received from a client.
#[derive(Clone, Debug, Default)]
pub struct StageChunkRequest {
    pub hash: Option<String>,
    pub chunk_index: Option<String>,
    pub total_chunks: Option<RawNumber>,
    pub filename: Option<String>,
    pub chunk: Option<Bytes>,
}

/// A validated chunk ready to be staged.
#[derive(Clone, Debug)]
pub struct ChunkUpload {
    pub session: SessionKey,
    pub index: ChunkIndex,
    pub total_chunks: u32,
    pub filename: ArtifactName,
    pub data: Bytes,
}

impl StageChunkRequest {
    /// Validate against the default chunk-count limit.
    pub fn validate(self) -> UploadResult<ChunkUpload> {
        self.validate_within(DEFAULT_MAX_TOTAL_CHUNKS)
    }

    pub fn validate_within(self, max_total_chunks: u32) -> UploadResult<ChunkUpload> {
        let session = session_key(self.hash.as_deref())?;
        let raw_index = present("chunkIndex", self.chunk_index.as_deref().map(str::trim))?;
        let index =
            ChunkIndex::parse(raw_index).map_err(|e| UploadError::malformed("chunkIndex", e))?;
        let total_chunks = chunk_count(self.total_chunks.as_ref(), max_total_chunks)?;
        if index.get() >= total_chunks {
            return Err(UploadError::malformed(
                "chunkIndex",
                format!("index {index} out of range for {total_chunks} chunks"),
            ));
        }
        let filename = artifact_name(self.filename.as_deref())?;
        let data = self.chunk.ok_or_else(|| UploadError::missing("chunk"))?;
        Ok(ChunkUpload {
            session,
            index,
            total_chunks,
            filename,
            data,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChunkResponse {
    pub success: bool,
    pub index: u32,
    pub size: u64,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub hash: Option<String>,
    pub filename: Option<String>,
    pub total_chunks: Option<RawNumber>,
}

/// A validated merge request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeSpec {
    pub session: SessionKey,
    pub filename: ArtifactName,
    pub total_chunks: u32,
}

impl MergeRequest {
    /// Validate against the default chunk-count limit.
    pub fn validate(&self) -> UploadResult<MergeSpec> {
        self.validate_within(DEFAULT_MAX_TOTAL_CHUNKS)
    }

    pub fn validate_within(&self, max_total_chunks: u32) -> UploadResult<MergeSpec> {
        Ok(MergeSpec {
            session: session_key(self.hash.as_deref())?,
            filename: artifact_name(self.filename.as_deref())?,
            total_chunks: chunk_count(self.total_chunks.as_ref(), max_total_chunks)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResponse {
    pub success: bool,
    pub filename: String,
    pub size: u64,
    pub locator: String,
}
