//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{actors::dispatcher::DispatchError, ingest::IngestError};

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request parameters or body
    #[error("{0}")]
    InvalidRequest(String),

    /// No usable bearer token was presented
    #[error("{0}")]
    Unauthorized(String),

    /// The bearer token does not match
    #[error("{0}")]
    Forbidden(String),

    /// The hub is not taking new work
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Alert store query failed
    #[error("{0}")]
    StorageError(String),

    /// Internal server error
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StorageError(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Registration(_) | IngestError::Transport(_) => {
                ApiError::InvalidRequest(err.to_string())
            }
            IngestError::Dispatch(DispatchError::Closed) => {
                ApiError::ServiceUnavailable("hub is shutting down".to_string())
            }
            IngestError::Dispatch(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<crate::storage::error::StorageError> for ApiError {
    fn from(err: crate::storage::error::StorageError) -> Self {
        ApiError::StorageError(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}
