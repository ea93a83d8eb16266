//! HTTP mapping for [`QuarryError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quarry_core::{ErrorKind, QuarryError};
use serde::Serialize;

/// Error body returned by every failing route: `{"message": ..., "error": ...}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                message: message.into(),
                error: None,
            },
        }
    }

    /// Classify `err`. Caller mistakes keep their own message; server-side
    /// and upstream failures report `context` with the cause in `error`.
    pub fn from_error(err: &QuarryError, context: &str) -> Self {
        let (status, message, error) = match err.kind() {
            ErrorKind::InvalidArgument
            | ErrorKind::SourceNotFound
            | ErrorKind::OutsideBoundary => {
                (StatusCode::BAD_REQUEST, err.to_string(), None)
            }
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, err.to_string(), None),
            ErrorKind::Upstream | ErrorKind::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                context.to_string(),
                Some(err.to_string()),
            ),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "{context}");
        } else {
            tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
        }
        Self {
            status,
            body: ErrorBody { message, error },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
