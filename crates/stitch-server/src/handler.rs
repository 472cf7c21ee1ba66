use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stitch_upload::{
    ArtifactInfo, MergeRequest, MergeResponse, RawNumber, StageChunkRequest, StageChunkResponse,
    StatusRequest, StatusResponse, UploadService,
};
use tokio_util::io::ReaderStream;

use crate::error::ServerResult;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<UploadService>,
}

impl AppState {
    pub fn new(service: Arc<UploadService>) -> Self {
        Self { service }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<ArtifactInfo>,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// `POST /upload/check`
pub async fn check_handler(
    State(state): State<AppState>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> ServerResult<Json<StatusResponse>> {
    let Json(req) = payload?;
    Ok(Json(state.service.check_status(&req).await?))
}

/// `POST /upload/chunk`
///
/// Multipart form with text fields `hash`, `chunkIndex`, `totalChunks`,
/// `filename` and the chunk payload in the file part `chunk`. Unknown
/// fields are ignored.
pub async fn chunk_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<StageChunkResponse>> {
    let mut req = StageChunkRequest::default();
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("hash") => req.hash = Some(field.text().await?),
            Some("chunkIndex") => req.chunk_index = Some(field.text().await?),
            Some("totalChunks") => req.total_chunks = Some(RawNumber::Text(field.text().await?)),
            Some("filename") => req.filename = Some(field.text().await?),
            Some("chunk") => req.chunk = Some(field.bytes().await?),
            _ => {}
        }
    }
    Ok(Json(state.service.stage_chunk(req).await?))
}

/// `POST /upload/merge`
pub async fn merge_handler(
    State(state): State<AppState>,
    payload: Result<Json<MergeRequest>, JsonRejection>,
) -> ServerResult<Json<MergeResponse>> {
    let Json(req) = payload?;
    Ok(Json(state.service.merge(&req).await?))
}

/// `GET /files`
pub async fn list_handler(State(state): State<AppState>) -> ServerResult<Json<FileListResponse>> {
    let files = state.service.list_files().await?;
    Ok(Json(FileListResponse { files }))
}

/// `GET /files/:filename`, streamed from the artifact store.
///
/// No `Content-Length` is sent: an overwriting merge may replace the artifact
/// while it is being served, and only the opened stream is authoritative.
pub async fn download_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ServerResult<Response> {
    let reader = state.service.open_file(&filename).await?;
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(reader))).into_response())
}
