//! Domain types for the fleet state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker identity: the container name, e.g. `translation_3`.
pub type WorkerName = String;

/// Identifies one dispatch of one task to one worker.
pub type DispatchId = u64;

/// Lifecycle status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Container created, readiness probe not yet passed.
    Starting,
    /// Ready and routable.
    Running,
    /// Being retired; receives no new dispatches.
    Draining,
    /// Cleared for removal; the record is about to be deleted.
    Removed,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Draining => "draining",
            WorkerStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Point-in-time copy of a worker record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub name: WorkerName,
    pub container_id: String,
    pub address: String,
    pub status: WorkerStatus,
    pub inflight: u32,
    pub outstanding: usize,
}

/// Desired replica count for an image. The latest value wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaTarget {
    pub count: u32,
    pub image: String,
}

/// The worker chosen for a task, with the handle of the new dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub worker: WorkerName,
    pub address: String,
    pub dispatch_id: DispatchId,
}

/// Numeric suffix of a worker name (`translation_12` → `12`).
pub fn worker_index(name: &str) -> Option<u32> {
    name.rsplit_once('_')?.1.parse().ok()
}

/// Format the name of the `index`-th worker of `image`.
///
/// Registry paths and tags are flattened so the result is a valid
/// container name (`registry.local/asr:v2` → `registry.local_asr_v2_1`).
pub fn worker_name(image: &str, index: u32) -> WorkerName {
    let base: String = image
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{base}_{index}")
}
