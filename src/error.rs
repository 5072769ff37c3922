use crate::security::AuthError;
use crate::storage::StorageError;
use crate::upstream::PacsError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients before any response bytes were sent.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Upstream(#[from] PacsError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProxyError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ProxyError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ProxyError::Unauthorized(e) => (StatusCode::UNAUTHORIZED, e.to_string()),
            ProxyError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ProxyError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ProxyError::Upstream(PacsError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Resource not found on PACS".to_string())
            }
            ProxyError::Upstream(PacsError::Status { status, .. }) => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                "PACS returned an error".to_string(),
            ),
            ProxyError::Upstream(e) if e.is_timeout() => {
                (StatusCode::GATEWAY_TIMEOUT, "PACS request timed out".to_string())
            }
            ProxyError::Upstream(_) => (StatusCode::BAD_GATEWAY, "PACS unavailable".to_string()),
            ProxyError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal storage error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {}", self);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
