use std::fmt;

use stitch_store::StoreError;
use thiserror::Error;

/// Why a request field was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgumentProblem {
    /// The field was absent or empty.
    Missing,
    /// The field was present but could not be used.
    Malformed(String),
}

impl fmt::Display for ArgumentProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::Malformed(reason) => write!(f, "malformed ({reason})"),
        }
    }
}

/// Errors returned by every upload operation.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid argument `{field}`: {problem}")]
    InvalidArgument {
        field: &'static str,
        problem: ArgumentProblem,
    },

    #[error("chunk {index} is empty")]
    EmptyChunk { index: u32 },

    #[error("missing chunks: {}", join_indices(.0))]
    MissingChunks(Vec<u32>),

    #[error("storage error: {0}")]
    Io(#[from] StoreError),

    #[error("merge failed: {0}")]
    MergeFailed(String),

    #[error("merge already in progress for {0}")]
    Conflict(String),

    #[error("artifact already exists: {0}")]
    AlreadyExists(String),

    #[error("artifact not found: {0}")]
    NotFound(String),
}

impl UploadError {
    pub fn missing(field: &'static str) -> Self {
        Self::InvalidArgument {
            field,
            problem: ArgumentProblem::Missing,
        }
    }

    pub fn malformed(field: &'static str, reason: impl fmt::Display) -> Self {
        Self::InvalidArgument {
            field,
            problem: ArgumentProblem::Malformed(reason.to_string()),
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::EmptyChunk { .. } => "empty_chunk",
            Self::MissingChunks(_) => "missing_chunks",
            Self::Io(_) => "io_error",
            Self::MergeFailed(_) => "merge_failed",
            Self::Conflict(_) => "conflict",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Whether repeating the same request unchanged can succeed.
    ///
    /// `EmptyChunk` and `MissingChunks` need the client to send data first,
    /// so they are not retryable as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::MergeFailed(_) | Self::Conflict(_))
    }
}

fn join_indices(indices: &[u32]) -> String {
    indices
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
