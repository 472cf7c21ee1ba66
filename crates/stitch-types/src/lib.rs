//! Foundation types for Stitch, a resumable chunked-upload engine.
//!
//! Every other Stitch crate depends on `stitch-types`. The types here are
//! validated on construction so that anything holding one can use it as a
//! storage key without further checks.
//!
//! # Key Types
//!
//! - [`SessionKey`]: client-chosen opaque identifier of one upload attempt
//! - [`ArtifactName`]: filename of a finished artifact
//! - [`ChunkKey`]: staging key of one chunk, rendered as `"<hash>-<index>"`

pub mod artifact;
pub mod chunk;
pub mod error;
pub mod session;

pub use artifact::ArtifactName;
pub use chunk::{parse_chunk_count, ChunkIndex, ChunkKey};
pub use error::TypeError;
pub use session::SessionKey;

/// Validate that `value` can be used as a single storage path component.
///
/// Shared by [`SessionKey`] and [`ArtifactName`].
pub(crate) fn check_component(value: &str) -> Result<(), TypeError> {
    if value.is_empty() {
        return Err(TypeError::Empty);
    }
    if value.starts_with('.') {
        return Err(TypeError::LeadingDot(value.to_string()));
    }
    if let Some(c) = value.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(TypeError::ForbiddenChar {
            value: value.to_string(),
            ch: c,
        });
    }
    if value.chars().any(char::is_control) {
        return Err(TypeError::ControlChar(value.to_string()));
    }
    Ok(())
}
