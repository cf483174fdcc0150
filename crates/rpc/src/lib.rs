use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sandbox_executor::{SandboxError, Status};
use thiserror::Error;

pub mod handlers;
pub mod server;
pub mod types;

pub use server::*;
pub use types::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("failed to encode response: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("execution worker failed: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(_)
            | ApiError::Sandbox(SandboxError::MalformedRequest(_))
            | ApiError::Sandbox(SandboxError::NegativeAmount(_)) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Sandbox(SandboxError::StateUnavailable)
            | ApiError::Sandbox(SandboxError::ExecutionAborted(_))
            | ApiError::Encoding(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(err = %self, "request failed");
        } else {
            tracing::debug!(err = %self, "request rejected");
        }
        let body = ErrorBody {
            status: Status::Error,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Sandbox(SandboxError::NegativeAmount(-1)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Sandbox(SandboxError::MalformedRequest("0xzz".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("0x01".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Sandbox(SandboxError::StateUnavailable).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Sandbox(SandboxError::ExecutionAborted("panicked".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Internal("panicked".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
