use crate::storage::StorageError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Client-side upload problems. The display text is returned verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("No selected file")]
    EmptyFilename,
    #[error("File type not allowed")]
    DisallowedExtension,
    #[error("Invalid filename")]
    InvalidFilename,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Storage or detector failure. Details stay in the logs.
    #[error("dependency failure: {0:#}")]
    Dependency(anyhow::Error),
    #[error("{0} not found")]
    NotFound(String),
    /// Malformed or oversized multipart body.
    #[error("{}", .0.body_text())]
    Multipart(#[from] MultipartError),
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Multipart(err) => err.status(),
        }
    }

    /// Text safe to hand back to the client.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Dependency(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Label used on the request counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) | PipelineError::Multipart(_) => "invalid",
            PipelineError::Dependency(_) => "error",
            PipelineError::NotFound(_) => "not_found",
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) | StorageError::InvalidKey(key) => {
                PipelineError::NotFound(key)
            }
            other => PipelineError::Dependency(other.into()),
        }
    }
}

/// Body shape of an error response. The decision route answers with a
/// status/message pair, every other route with a bare `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Error,
    StatusMessage,
}

pub struct ApiError {
    pub error: PipelineError,
    pub envelope: Envelope,
}

impl ApiError {
    pub fn error(error: PipelineError) -> Self {
        Self {
            error,
            envelope: Envelope::Error,
        }
    }

    pub fn status_message(error: PipelineError) -> Self {
        Self {
            error,
            envelope: Envelope::StatusMessage,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.error.public_message();
        let body = match self.envelope {
            Envelope::Error => json!({ "error": message }),
            Envelope::StatusMessage => json!({ "status": "error", "message": message }),
        };
        (self.error.status_code(), Json(body)).into_response()
    }
}
