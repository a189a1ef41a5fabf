//! fleetgrid-state: in-memory fleet state for FleetGrid.
//!
//! A single `FleetState` object owns every worker record: lifecycle status,
//! in-flight task count, and the set of outstanding dispatch handles. All
//! reads and writes go through its accessors, which hold one mutex for the
//! duration of the update and never across an `.await`.
//!
//! # Lifecycle
//!
//! ```text
//! register_starting ──► Starting ──mark_running──► Running ◄── finish_drain(false)
//!                                                    │            restore_running
//!                                               begin_drain             │
//!                                                    ▼                  │
//!                                                 Draining ─────────────┘
//!                                                    │
//!                                            finish_drain(true) ──► Removed
//! ```
//!
//! Only `Running` workers are routable. The state is `Clone` and cheap to
//! share across tasks (backed by `Arc<Mutex<_>>`).

pub mod balancer;
pub mod error;
pub mod fleet;
pub mod types;

pub use balancer::RoundRobin;
pub use error::{StateError, StateResult};
pub use fleet::{DrainWatch, FleetState};
pub use types::*;
