use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all Stitch endpoints.
pub fn build_router(state: AppState, max_chunk_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handler::health_handler))
        .route("/upload/check", post(handler::check_handler))
        .route(
            "/upload/chunk",
            post(handler::chunk_handler).layer(DefaultBodyLimit::max(max_chunk_bytes)),
        )
        .route("/upload/merge", post(handler::merge_handler))
        .route("/files", get(handler::list_handler))
        .route("/files/:filename", get(handler::download_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
