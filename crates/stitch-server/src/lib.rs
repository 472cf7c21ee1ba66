//! HTTP server for Stitch.
//!
//! Exposes the resumable upload flow over REST: ask which chunks of a
//! session are staged, stage one chunk as a multipart form, merge a complete
//! session, and list or download merged files.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ErrorBody, ServerError, ServerResult};
pub use handler::{AppState, FileListResponse, HealthResponse};
pub use server::StitchServer;
