use sandbox_types::TypesError;
use thiserror::Error;

/// Reasons a sandbox operation is refused before it reaches the engine.
///
/// Engine failures are not errors at this level: they are reported inside
/// the response with an `error` status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("negative amount: {0}")]
    NegativeAmount(i64),

    #[error("world state unavailable")]
    StateUnavailable,

    #[error("execution aborted: {0}")]
    ExecutionAborted(String),
}

impl From<TypesError> for SandboxError {
    fn from(err: TypesError) -> Self {
        SandboxError::MalformedRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
