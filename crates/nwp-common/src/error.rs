//! Error types for the shared data model.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised when building shared types from text or raw codes.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Unknown level type: {0}")]
    UnknownLevelType(String),

    #[error("Invalid parameter code: {0}")]
    InvalidParameterCode(String),
}
