use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::session::SessionKey;

/// Zero-based position of a chunk within its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkIndex(u32);

impl ChunkIndex {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Parse a decimal, non-negative chunk index as sent by a client.
    ///
    /// Only ASCII digits are accepted; signs, whitespace and trailing garbage
    /// are rejected.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        parse_digits(raw)
            .map(Self)
            .ok_or_else(|| TypeError::InvalidIndex(raw.to_string()))
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ChunkIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// Parse a positive chunk count (`totalChunks`).
pub fn parse_chunk_count(raw: &str) -> Result<u32, TypeError> {
    match parse_digits(raw) {
        Some(n) if n > 0 => Ok(n),
        _ => Err(TypeError::InvalidCount(raw.to_string())),
    }
}

fn parse_digits(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Staging key of one chunk: the pair `(session, index)`.
///
/// Rendered as `"<hash>-<index>"`. Because a session key may itself contain
/// dashes, parsing is always done against a known session prefix.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ChunkKey {
    pub session: SessionKey,
    pub index: ChunkIndex,
}

impl ChunkKey {
    pub fn new(session: SessionKey, index: ChunkIndex) -> Self {
        Self { session, index }
    }

    /// Parse the trailing index of `key` if it belongs to `session`.
    ///
    /// Returns `None` for keys of other sessions and for any entry whose
    /// suffix is not a canonical decimal index (leading zeros, signs, extra
    /// dashes). Scans use this to skip unrelated files.
    pub fn index_for(session: &SessionKey, key: &str) -> Option<ChunkIndex> {
        let suffix = key.strip_prefix(session.as_str())?.strip_prefix('-')?;
        if suffix.len() > 1 && suffix.starts_with('0') {
            return None;
        }
        parse_digits(suffix).map(ChunkIndex)
    }

    /// Split a raw staging key into its session and index.
    ///
    /// The index is taken after the last dash.
    pub fn parse(key: &str) -> Result<Self, TypeError> {
        let malformed = || TypeError::MalformedChunkKey(key.to_string());
        let (hash, _) = key.rsplit_once('-').ok_or_else(malformed)?;
        let session = SessionKey::new(hash).map_err(|_| malformed())?;
        let index = Self::index_for(&session, key).ok_or_else(malformed)?;
        Ok(Self { session, index })
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.session, self.index)
    }
}
