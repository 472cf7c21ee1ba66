use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use stitch_upload::UploadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("malformed JSON body: {}", .0.body_text())]
    Json(#[from] JsonRejection),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u32>>,
}

impl ServerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upload(e) => e.kind(),
            Self::Multipart(_) | Self::Json(_) => "invalid_argument",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Upload(e) => match e {
                UploadError::InvalidArgument { .. } | UploadError::EmptyChunk { .. } => {
                    StatusCode::BAD_REQUEST
                }
                UploadError::MissingChunks(_)
                | UploadError::Conflict(_)
                | UploadError::AlreadyExists(_) => StatusCode::CONFLICT,
                UploadError::NotFound(_) => StatusCode::NOT_FOUND,
                UploadError::Io(_) | UploadError::MergeFailed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Multipart(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let missing = match &self {
            Self::Upload(UploadError::MissingChunks(m)) => Some(m.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            missing,
        };
        (status, Json(body)).into_response()
    }
}
