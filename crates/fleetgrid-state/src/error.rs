//! Error types for the fleet state.

use thiserror::Error;

use crate::types::WorkerStatus;

/// Result type alias for fleet state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors returned by `FleetState` accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("worker already registered: {0}")]
    AlreadyRegistered(String),

    #[error("worker {name} is {status}, expected {expected}")]
    InvalidTransition {
        name: String,
        status: WorkerStatus,
        expected: WorkerStatus,
    },

    #[error("no running workers")]
    NoCapacity,
}
