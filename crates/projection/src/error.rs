//! Projection error types.

use thiserror::Error;

pub type ProjectionResult<T> = Result<T, ProjectionError>;

#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The grid uses a template coordinates cannot be computed for.
    #[error("Unsupported projection: grid template {template}")]
    UnsupportedProjection { template: u16 },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),
}
