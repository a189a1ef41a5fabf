//! Dispatch error types.

use thiserror::Error;

/// Errors from routing a task or posting it to a worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid task: {0}")]
    InvalidInput(String),

    #[error("no running workers")]
    NoCapacity,

    #[error("dispatch queue is full")]
    QueueFull,

    #[error("dispatch pool is shut down")]
    PoolClosed,

    #[error("request to {address} failed: {reason}")]
    Transport { address: String, reason: String },

    #[error("worker {address} answered {status}")]
    WorkerStatus { address: String, status: u16 },

    #[error("request to {address} timed out")]
    Timeout { address: String },

    #[error("fleet state error: {0}")]
    State(#[from] fleetgrid_state::StateError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
