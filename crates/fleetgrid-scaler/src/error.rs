//! Scaling error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The runtime could not list containers; nothing was changed.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

pub type ScaleResult<T> = Result<T, ScaleError>;
