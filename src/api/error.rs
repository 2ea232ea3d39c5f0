//! Mapping of [`AppError`] onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::AppError;

/// Structured error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable code.
    pub code: String,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateService(_) | Self::AlreadyRunning(_) => StatusCode::CONFLICT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::DaemonUnreachable(_) | Self::DaemonRejected { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::Io(_)
            | Self::Directory(_)
            | Self::PortExhausted(_)
            | Self::Runtime(_)
            | Self::StatusChannel(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Io(_) => "IO",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::DuplicateService(_) => "DUPLICATE_SERVICE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Directory(_) => "DIRECTORY",
            Self::PortExhausted(_) => "PORT_EXHAUSTED",
            Self::Runtime(_) => "RUNTIME",
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::DaemonUnreachable(_) => "DAEMON_UNREACHABLE",
            Self::DaemonRejected { .. } => "DAEMON_REJECTED",
            Self::StatusChannel(_) => "STATUS_CHANNEL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(error_code = code, %message, "request failed");
        } else if status == StatusCode::CONFLICT {
            warn!(error_code = code, %message, "request conflicts with current state");
        } else {
            debug!(error_code = code, %message, "client error");
        }

        let body = ErrorResponse {
            error: message,
            code: code.to_owned(),
        };
        (status, Json(body)).into_response()
    }
}
