//! Bounded asynchronous dispatch pool.
//!
//! Jobs go into a bounded channel shared by a fixed number of tokio tasks.
//! Each task posts the job to its worker and then closes the dispatch in
//! `FleetState`, whatever the outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use fleetgrid_state::{DispatchId, FleetState};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::client::TaskClient;
use crate::error::{DispatchError, DispatchResult};
use crate::task::TaskRequest;

/// One queued delivery.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub worker: String,
    pub address: String,
    pub dispatch_id: DispatchId,
    pub task: TaskRequest,
}

/// Running totals, exposed on the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub queued: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<DispatchJob>>>;

/// Fixed-size pool of dispatch tasks.
pub struct DispatchPool {
    tx: Mutex<Option<mpsc::Sender<DispatchJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl DispatchPool {
    /// Spawn `workers` dispatch tasks reading from a queue of `capacity`.
    pub fn start(
        fleet: FleetState,
        client: Arc<dyn TaskClient>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers.max(1))
            .map(|slot| {
                tokio::spawn(run_worker(
                    slot,
                    rx.clone(),
                    fleet.clone(),
                    client.clone(),
                    counters.clone(),
                ))
            })
            .collect();

        info!(workers = workers.max(1), capacity = capacity.max(1), "dispatch pool started");
        Self {
            tx: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
            counters,
        }
    }

    /// Queue a job without waiting.
    ///
    /// Fails with `QueueFull` when every slot is taken and `PoolClosed`
    /// after `close`. On failure the job is not delivered and the caller
    /// owns closing its dispatch.
    pub fn submit(&self, job: DispatchJob) -> DispatchResult<()> {
        let guard = self.tx.lock().expect("dispatch sender lock");
        let tx = guard.as_ref().ok_or(DispatchError::PoolClosed)?;
        tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::PoolClosed,
        })?;
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stop accepting jobs. Already queued jobs are still delivered.
    pub fn close(&self) {
        self.tx.lock().expect("dispatch sender lock").take();
    }

    /// Close the queue and wait until every queued job has been handled.
    pub async fn shutdown(&self) {
        self.close();
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.handles.lock().expect("dispatch handles lock"));
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatch task panicked");
            }
        }
        info!("dispatch pool stopped");
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    slot: usize,
    rx: SharedReceiver,
    fleet: FleetState,
    client: Arc<dyn TaskClient>,
    counters: Arc<Counters>,
) {
    loop {
        let job = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(job) = job else {
            debug!(slot, "dispatch queue closed");
            break;
        };

        let started = Instant::now();
        match client.submit(&job.address, &job.task).await {
            Ok(()) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    worker = %job.worker,
                    dispatch_id = job.dispatch_id,
                    audio_id = job.task.audio_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "task completed"
                );
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = %job.worker,
                    dispatch_id = job.dispatch_id,
                    audio_id = job.task.audio_id,
                    error = %e,
                    "task dispatch failed"
                );
            }
        }
        fleet.complete_dispatch(&job.worker, job.dispatch_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Client that blocks every call until released.
    struct GatedClient {
        gate: Notify,
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl TaskClient for GatedClient {
        async fn submit(&self, _address: &str, task: &TaskRequest) -> DispatchResult<()> {
            self.gate.notified().await;
            self.seen.lock().unwrap().push(task.audio_id);
            Ok(())
        }
    }

    fn fleet_with_worker() -> FleetState {
        let fleet = FleetState::new();
        fleet.register_starting("translation_1", "c1", "10.0.0.1").unwrap();
        fleet.mark_running("translation_1").unwrap();
        fleet
    }

    fn job_for(fleet: &FleetState, audio_id: i64) -> DispatchJob {
        let a = fleet.assign_next().unwrap();
        DispatchJob {
            worker: a.worker,
            address: a.address,
            dispatch_id: a.dispatch_id,
            task: TaskRequest::new(audio_id, "a.wav"),
        }
    }

    #[tokio::test]
    async fn completion_closes_the_dispatch() {
        let fleet = fleet_with_worker();
        let client = Arc::new(GatedClient {
            gate: Notify::new(),
            seen: Mutex::new(Vec::new()),
        });
        let pool = DispatchPool::start(fleet.clone(), client.clone(), 2, 8);

        pool.submit(job_for(&fleet, 1)).unwrap();
        assert_eq!(fleet.load("translation_1"), Some((1, 1)));

        client.gate.notify_one();
        pool.shutdown().await;

        assert_eq!(fleet.load("translation_1"), Some((0, 0)));
        assert_eq!(*client.seen.lock().unwrap(), vec![1]);
        assert_eq!(
            pool.stats(),
            PoolStats {
                queued: 1,
                succeeded: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn full_queue_is_reported() {
        let fleet = fleet_with_worker();
        let client = Arc::new(GatedClient {
            gate: Notify::new(),
            seen: Mutex::new(Vec::new()),
        });
        let pool = DispatchPool::start(fleet.clone(), client.clone(), 1, 1);

        // The single worker takes the first job and blocks on the gate;
        // the second fills the queue.
        pool.submit(job_for(&fleet, 1)).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        pool.submit(job_for(&fleet, 2)).unwrap();

        let third = job_for(&fleet, 3);
        assert!(matches!(pool.submit(third), Err(DispatchError::QueueFull)));
    }

    #[tokio::test]
    async fn submit_after_close_fails() {
        let fleet = fleet_with_worker();
        let client = Arc::new(GatedClient {
            gate: Notify::new(),
            seen: Mutex::new(Vec::new()),
        });
        let pool = DispatchPool::start(fleet.clone(), client, 1, 4);
        pool.close();

        assert!(matches!(pool.submit(job_for(&fleet, 1)), Err(DispatchError::PoolClosed)));
    }

    /// Worker that answers every task with a 500.
    struct RejectingClient;

    #[async_trait]
    impl TaskClient for RejectingClient {
        async fn submit(&self, address: &str, _task: &TaskRequest) -> DispatchResult<()> {
            Err(DispatchError::WorkerStatus {
                address: address.to_string(),
                status: 500,
            })
        }
    }

    #[tokio::test]
    async fn failed_delivery_still_closes_the_dispatch() {
        let fleet = fleet_with_worker();
        let pool = DispatchPool::start(fleet.clone(), Arc::new(RejectingClient), 2, 8);

        pool.submit(job_for(&fleet, 1)).unwrap();
        pool.shutdown().await;

        assert_eq!(fleet.load("translation_1"), Some((0, 0)));
        assert_eq!(
            pool.stats(),
            PoolStats {
                queued: 1,
                succeeded: 0,
                failed: 1
            }
        );
    }
}
