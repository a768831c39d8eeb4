//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cruise_domain::prelude::{ErrorKind, OperationResult};

/// Errors returned by the REST surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Unknown agent.
    #[error("{0}")]
    NotFound(String),
    /// Configuration problem.
    #[error("{0}")]
    BadRequest(String),
    /// Refused by policy or already in progress.
    #[error("{0}")]
    Conflict(String),
    /// Chain or collaborator unavailable.
    #[error("{0}")]
    BadGateway(String),
    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Maps an engine error class to an API error.
    #[must_use]
    pub fn from_kind(kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            Some(ErrorKind::NotFound) => Self::NotFound(message),
            Some(ErrorKind::Configuration) => Self::BadRequest(message),
            Some(ErrorKind::PolicyDenied | ErrorKind::Busy) => Self::Conflict(message),
            Some(ErrorKind::TransientInfra) => Self::BadGateway(message),
            Some(ErrorKind::Persistence | ErrorKind::Unrecoverable) | None => {
                Self::Internal(message)
            }
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OperationResult> for ApiError {
    fn from(result: OperationResult) -> Self {
        Self::from_kind(result.error_kind, result.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
            "code": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}
