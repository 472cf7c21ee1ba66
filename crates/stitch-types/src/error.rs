use thiserror::Error;

/// Errors produced when constructing validated identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("value must not be empty")]
    Empty,

    #[error("value must not start with '.': {0:?}")]
    LeadingDot(String),

    #[error("value {value:?} contains forbidden character {ch:?}")]
    ForbiddenChar { value: String, ch: char },

    #[error("value contains control characters: {0:?}")]
    ControlChar(String),

    #[error("invalid chunk index: {0:?}")]
    InvalidIndex(String),

    #[error("invalid chunk count: {0:?}")]
    InvalidCount(String),

    #[error("malformed chunk key: {0:?}")]
    MalformedChunkKey(String),
}
