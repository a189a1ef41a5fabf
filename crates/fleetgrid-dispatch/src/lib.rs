//! fleetgrid-dispatch: task routing and asynchronous dispatch.
//!
//! The `TaskRouter` validates a task, picks the next running worker from
//! `FleetState` (round robin), opens a dispatch on it, and hands the job
//! to the `DispatchPool`. It returns as soon as the job is queued.
//!
//! # Architecture
//!
//! ```text
//! TaskRouter::route_and_dispatch
//!   ├── TaskRequest::from_value      (InvalidInput, nothing touched)
//!   ├── FleetState::assign_next      (NoCapacity | inflight += 1)
//!   └── DispatchPool::submit ──► bounded mpsc ──► N pool workers
//!                                                  ├── TaskClient::submit (HTTP POST)
//!                                                  └── FleetState::complete_dispatch (inflight -= 1)
//! ```
//!
//! Failed dispatches are logged and counted; they are never retried.

pub mod client;
pub mod error;
pub mod pool;
pub mod router;
pub mod task;

pub use client::{HttpTaskClient, TaskClient};
pub use error::{DispatchError, DispatchResult};
pub use pool::{DispatchJob, DispatchPool, PoolStats};
pub use router::{Accepted, TaskRouter};
pub use task::TaskRequest;
