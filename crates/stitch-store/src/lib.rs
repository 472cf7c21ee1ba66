//! Keyed blob storage for Stitch.
//!
//! A blob store is a flat namespace of named byte blobs. Stitch uses two
//! independent stores: one for staged chunks (keyed `"<hash>-<index>"`) and
//! one for finished artifacts (keyed by filename).
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`]: `HashMap`-based store for tests and embedding
//! - [`FsBlobStore`]: one file per key under a root directory
//!
//! # Design Rules
//!
//! 1. Writes are atomic per key: a reader sees either the previous blob or the
//!    complete new one, never a prefix.
//! 2. Streaming writes are invisible under their final key until `finish`.
//! 3. `abort` discards a streaming write without touching the final key.
//! 4. Keys are single path components; hidden names are reserved for temps.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;
pub use traits::{BlobMeta, BlobReader, BlobStore, BlobWriter};

/// Reject keys that could escape a flat namespace or collide with temps.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
        || key.chars().any(char::is_control);
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
