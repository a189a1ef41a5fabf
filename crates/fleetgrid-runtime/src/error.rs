//! Runtime port error types.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur while driving the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime itself cannot be reached.
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("failed to {op} container {target}: {reason}")]
    Operation {
        op: &'static str,
        target: String,
        reason: String,
    },

    #[error("container {id} has no address on network {network}")]
    NoAddress { id: String, network: String },
}

impl RuntimeError {
    pub fn operation(op: &'static str, target: &str, reason: impl ToString) -> Self {
        RuntimeError::Operation {
            op,
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}
