//! Task router: validate, pick a worker, enqueue.

use std::sync::Arc;

use fleetgrid_state::{DispatchId, FleetState, StateError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::pool::{DispatchJob, DispatchPool};
use crate::task::TaskRequest;

/// Where an accepted task was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub worker: String,
    pub address: String,
    pub dispatch_id: DispatchId,
}

/// Routes tasks to running workers in round-robin order.
#[derive(Clone)]
pub struct TaskRouter {
    fleet: FleetState,
    pool: Arc<DispatchPool>,
}

impl TaskRouter {
    pub fn new(fleet: FleetState, pool: Arc<DispatchPool>) -> Self {
        Self { fleet, pool }
    }

    pub fn pool(&self) -> &Arc<DispatchPool> {
        &self.pool
    }

    /// Validate a raw task body and hand it to the next running worker.
    ///
    /// Invalid input is rejected before any state is touched. Returns once
    /// the job is queued, not when the worker finishes.
    pub fn route_and_dispatch(&self, body: Value) -> DispatchResult<Accepted> {
        let task = TaskRequest::from_value(body)?;
        self.dispatch(task)
    }

    /// Route an already validated task.
    pub fn dispatch(&self, task: TaskRequest) -> DispatchResult<Accepted> {
        let assignment = self.fleet.assign_next().map_err(|e| match e {
            StateError::NoCapacity => DispatchError::NoCapacity,
            other => DispatchError::State(other),
        })?;

        let job = DispatchJob {
            worker: assignment.worker.clone(),
            address: assignment.address.clone(),
            dispatch_id: assignment.dispatch_id,
            task,
        };
        let audio_id = job.task.audio_id;

        if let Err(e) = self.pool.submit(job) {
            // Nothing will complete this dispatch; close it here.
            self.fleet
                .complete_dispatch(&assignment.worker, assignment.dispatch_id);
            warn!(worker = %assignment.worker, audio_id, error = %e, "task not queued");
            return Err(e);
        }

        debug!(
            worker = %assignment.worker,
            dispatch_id = assignment.dispatch_id,
            audio_id,
            "task routed"
        );
        Ok(Accepted {
            worker: assignment.worker,
            address: assignment.address,
            dispatch_id: assignment.dispatch_id,
        })
    }
}
