//! Error responses of the HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shellbridge_protocol::api::ErrorBody;
use thiserror::Error;

use crate::exec::ExecError;
use crate::session::SessionError;

/// Errors returned by the JSON endpoints as `{message}` bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid session id.")]
    InvalidSessionId,

    #[error("Session not found.")]
    SessionNotFound,

    #[error("Failed to start terminal session: {0}")]
    SpawnFailed(#[from] SessionError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidSessionId => StatusCode::BAD_REQUEST,
            ApiError::SessionNotFound => StatusCode::NOT_FOUND,
            ApiError::SpawnFailed(SessionError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::SpawnFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Exec(ExecError::CustomDisabled) => StatusCode::FORBIDDEN,
            ApiError::Exec(ExecError::UnknownPreset(_) | ExecError::CommandRequired) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
