//! Error types for the pdfedit server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfedit_core::PdfEditError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file provided")]
    NoFile,

    #[error("Invalid file")]
    InvalidFile,

    #[error("Invalid session")]
    InvalidSession,

    #[error("No changes")]
    NoChanges,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Processing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NoFile => (StatusCode::BAD_REQUEST, "NO_FILE"),
            ApiError::InvalidFile => (StatusCode::BAD_REQUEST, "INVALID_FILE"),
            ApiError::InvalidSession => (StatusCode::NOT_FOUND, "INVALID_SESSION"),
            ApiError::NoChanges => (StatusCode::BAD_REQUEST, "NO_CHANGES"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Processing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PROCESSING_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<PdfEditError> for ApiError {
    fn from(err: PdfEditError) -> Self {
        match err {
            PdfEditError::SessionNotFound(_) | PdfEditError::SessionExpired(_) => {
                ApiError::InvalidSession
            }
            PdfEditError::EmptyLedger => ApiError::NoChanges,
            PdfEditError::InvalidBBox(_)
            | PdfEditError::InvalidEdit(_)
            | PdfEditError::ColorOutOfRange(_) => ApiError::InvalidRequest(err.to_string()),
            other => ApiError::Processing(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::InvalidRequest(err.body_text())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
