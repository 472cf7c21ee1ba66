use std::sync::Arc;

use stitch_upload::UploadService;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Stitch upload server.
pub struct StitchServer {
    config: ServerConfig,
}

impl StitchServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the configured staging and artifact directories.
    pub async fn open_service(&self) -> ServerResult<UploadService> {
        Ok(UploadService::open_dirs(
            &self.config.staging_dir,
            &self.config.artifacts_dir,
            self.config.upload.clone(),
        )
        .await?)
    }

    /// Build the router over an existing service (useful for testing).
    pub fn router(&self, service: Arc<UploadService>) -> axum::Router {
        build_router(AppState::new(service), self.config.max_chunk_bytes)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let service = Arc::new(self.open_service().await?);
        let app = self.router(service);
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            staging = %self.config.staging_dir.display(),
            artifacts = %self.config.artifacts_dir.display(),
            "stitch server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
