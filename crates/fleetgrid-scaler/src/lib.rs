//! fleetgrid-scaler: reconciles the worker fleet with its replica target.
//!
//! One reconciliation pass:
//!
//! ```text
//! list_running(image) ──► membership sync ──► difference
//!                                              ├── > 0: start (bounded) ──► probe ──► Running
//!                                              └── < 0: drain least busy ──► stop + remove
//! list_running(image) ──► membership sync ──► publish Running addresses
//! ```
//!
//! Passes are serialized; per-worker failures are logged and never abort
//! a pass. Only a failed initial listing fails the call.

pub mod drain;
pub mod error;
pub mod manager;

pub use drain::{DrainController, DrainOutcome};
pub use error::{ScaleError, ScaleResult};
pub use manager::{FleetManager, ManagerSettings};
