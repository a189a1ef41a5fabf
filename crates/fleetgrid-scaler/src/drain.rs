//! Drain controller: wait for a worker to go idle before removal.

use std::time::Duration;

use fleetgrid_state::{FleetState, StateError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of draining one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Idle at the final check; the worker is `Removed` and safe to stop.
    Drained,
    /// Still busy; the worker is back to `Running`.
    Retained { inflight: u32 },
}

#[derive(Clone)]
pub struct DrainController {
    fleet: FleetState,
    poll_interval: Duration,
    timeout: Duration,
}

impl DrainController {
    pub fn new(fleet: FleetState, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            fleet,
            poll_interval,
            timeout,
        }
    }

    /// Stop routing to `name` and wait until it has nothing in flight.
    ///
    /// The wait wakes on every completion for the worker and re-checks at
    /// least once per poll interval. When the overall timeout passes the
    /// worker is retained.
    pub async fn drain(&self, name: &str) -> Result<DrainOutcome, StateError> {
        let mut watch = self.fleet.begin_drain(name)?;
        info!(worker = %name, inflight = watch.inflight, outstanding = watch.outstanding, "draining worker");

        let deadline = Instant::now() + self.timeout;
        loop {
            let (inflight, outstanding) = self.fleet.load(name).unwrap_or((0, 0));
            if inflight == 0 && outstanding == 0 {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                self.fleet.restore_running(name)?;
                warn!(worker = %name, inflight, "drain timed out; keeping worker");
                return Ok(DrainOutcome::Retained { inflight });
            }

            let wake = deadline.min(now + self.poll_interval);
            match tokio::time::timeout_at(wake, watch.changes.changed()).await {
                Ok(Ok(())) => {
                    let inflight = *watch.changes.borrow_and_update();
                    debug!(worker = %name, inflight, "load changed");
                }
                // Sender gone: the entry was dropped. The next load() sees it.
                Ok(Err(_)) => tokio::time::sleep_until(wake).await,
                Err(_) => {}
            }
        }

        if self.fleet.finish_drain(name)? {
            info!(worker = %name, "worker drained");
            Ok(DrainOutcome::Drained)
        } else {
            let inflight = self.fleet.load(name).map(|(n, _)| n).unwrap_or(0);
            info!(worker = %name, inflight, "new work arrived during drain; keeping worker");
            Ok(DrainOutcome::Retained { inflight })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgrid_state::WorkerStatus;

    fn fleet_with(names: &[&str]) -> FleetState {
        let fleet = FleetState::new();
        for (i, name) in names.iter().enumerate() {
            fleet
                .register_starting(name, &format!("c{i}"), &format!("10.0.0.{}", i + 1))
                .unwrap();
            fleet.mark_running(name).unwrap();
        }
        fleet
    }

    #[tokio::test]
    async fn idle_worker_drains_immediately() {
        let fleet = fleet_with(&["translation_1"]);
        let drain = DrainController::new(fleet.clone(), Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(drain.drain("translation_1").await.unwrap(), DrainOutcome::Drained);
        assert_eq!(fleet.get("translation_1").unwrap().status, WorkerStatus::Removed);
    }

    #[tokio::test]
    async fn waits_for_completion_signal() {
        let fleet = fleet_with(&["translation_1"]);
        let a = fleet.assign_next().unwrap();
        let b = fleet.assign_next().unwrap();
        // Long poll interval: only the completion signal can wake the drain.
        let drain = DrainController::new(fleet.clone(), Duration::from_secs(30), Duration::from_secs(60));

        let finisher = {
            let fleet = fleet.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                fleet.complete_dispatch(&a.worker, a.dispatch_id);
                tokio::time::sleep(Duration::from_millis(20)).await;
                fleet.complete_dispatch(&b.worker, b.dispatch_id);
            })
        };

        let started = std::time::Instant::now();
        assert_eq!(drain.drain("translation_1").await.unwrap(), DrainOutcome::Drained);
        assert!(started.elapsed() < Duration::from_secs(5));
        finisher.await.unwrap();
    }

    #[tokio::test]
    async fn busy_worker_is_retained_after_timeout() {
        let fleet = fleet_with(&["translation_1"]);
        fleet.assign_next().unwrap();
        fleet.assign_next().unwrap();
        let drain = DrainController::new(
            fleet.clone(),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );

        assert_eq!(
            drain.drain("translation_1").await.unwrap(),
            DrainOutcome::Retained { inflight: 2 }
        );
        assert_eq!(fleet.get("translation_1").unwrap().status, WorkerStatus::Running);
    }

    #[tokio::test]
    async fn draining_worker_receives_no_new_dispatch() {
        let fleet = fleet_with(&["translation_1", "translation_2"]);
        let a = fleet.assign_next().unwrap();
        assert_eq!(a.worker, "translation_1");
        let drain = DrainController::new(fleet.clone(), Duration::from_millis(5), Duration::from_secs(5));

        let handle = {
            let drain = drain.clone();
            tokio::spawn(async move { drain.drain("translation_1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        for _ in 0..4 {
            assert_eq!(fleet.assign_next().unwrap().worker, "translation_2");
        }
        fleet.complete_dispatch(&a.worker, a.dispatch_id);
        assert_eq!(handle.await.unwrap().unwrap(), DrainOutcome::Drained);
    }

    #[tokio::test]
    async fn unknown_worker_is_an_error() {
        let drain = DrainController::new(FleetState::new(), Duration::from_millis(5), Duration::from_secs(1));
        assert!(matches!(
            drain.drain("ghost").await,
            Err(StateError::UnknownWorker(_))
        ));
    }
}
