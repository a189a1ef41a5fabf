//! The fleet registry.
//!
//! `FleetState` is the one authoritative membership snapshot: the fleet
//! manager is the only writer of membership and status, the task router
//! reads it to pick workers, and dispatch completions update the counts.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::balancer::RoundRobin;
use crate::error::{StateError, StateResult};
use crate::types::*;

/// One worker record.
struct WorkerEntry {
    container_id: String,
    address: String,
    status: WorkerStatus,
    inflight: u32,
    outstanding: HashSet<DispatchId>,
    /// Publishes the in-flight count after every change.
    load_tx: watch::Sender<u32>,
}

impl WorkerEntry {
    fn new(container_id: &str, address: &str, status: WorkerStatus) -> Self {
        let (load_tx, _) = watch::channel(0);
        Self {
            container_id: container_id.to_string(),
            address: address.to_string(),
            status,
            inflight: 0,
            outstanding: HashSet::new(),
            load_tx,
        }
    }

    fn is_idle(&self) -> bool {
        self.inflight == 0 && self.outstanding.is_empty()
    }

    fn snapshot(&self, name: &str) -> WorkerSnapshot {
        WorkerSnapshot {
            name: name.to_string(),
            container_id: self.container_id.clone(),
            address: self.address.clone(),
            status: self.status,
            inflight: self.inflight,
            outstanding: self.outstanding.len(),
        }
    }
}

struct Inner {
    /// Ordered by name so routing order is stable.
    workers: BTreeMap<WorkerName, WorkerEntry>,
    target: Option<ReplicaTarget>,
    cursor: RoundRobin,
    next_dispatch: DispatchId,
}

/// Handle returned by `begin_drain`: the worker's current load and a
/// receiver that wakes on every in-flight change.
pub struct DrainWatch {
    pub inflight: u32,
    pub outstanding: usize,
    pub changes: watch::Receiver<u32>,
}

/// Shared, mutex-guarded fleet registry.
#[derive(Clone)]
pub struct FleetState {
    inner: Arc<Mutex<Inner>>,
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                workers: BTreeMap::new(),
                target: None,
                cursor: RoundRobin::new(),
                next_dispatch: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("fleet lock")
    }

    // ── Replica target ──────────────────────────────────────────────

    /// Overwrite the replica target.
    pub fn set_target(&self, target: ReplicaTarget) {
        self.lock().target = Some(target);
    }

    pub fn target(&self) -> Option<ReplicaTarget> {
        self.lock().target.clone()
    }

    // ── Membership (fleet manager) ──────────────────────────────────

    /// Record a freshly created container that has not passed readiness.
    pub fn register_starting(&self, name: &str, container_id: &str, address: &str) -> StateResult<()> {
        let mut inner = self.lock();
        if inner.workers.contains_key(name) {
            return Err(StateError::AlreadyRegistered(name.to_string()));
        }
        inner.workers.insert(
            name.to_string(),
            WorkerEntry::new(container_id, address, WorkerStatus::Starting),
        );
        debug!(worker = %name, %address, "worker registered as starting");
        Ok(())
    }

    /// Promote a `Starting` worker to `Running`, making it routable.
    pub fn mark_running(&self, name: &str) -> StateResult<()> {
        let mut inner = self.lock();
        let entry = inner
            .workers
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownWorker(name.to_string()))?;
        if entry.status != WorkerStatus::Starting {
            return Err(StateError::InvalidTransition {
                name: name.to_string(),
                status: entry.status,
                expected: WorkerStatus::Starting,
            });
        }
        entry.status = WorkerStatus::Running;
        debug!(worker = %name, "worker running");
        Ok(())
    }

    /// Register an already-running container found in the runtime.
    ///
    /// Returns `false` if the worker is already known.
    pub fn adopt(&self, name: &str, container_id: &str, address: &str) -> bool {
        let mut inner = self.lock();
        if inner.workers.contains_key(name) {
            return false;
        }
        inner.workers.insert(
            name.to_string(),
            WorkerEntry::new(container_id, address, WorkerStatus::Running),
        );
        true
    }

    /// Delete a worker record. Outstanding dispatches that complete later
    /// are ignored.
    pub fn remove(&self, name: &str) -> Option<WorkerSnapshot> {
        let mut inner = self.lock();
        let entry = inner.workers.remove(name)?;
        if !entry.is_idle() {
            warn!(
                worker = %name,
                inflight = entry.inflight,
                "removing worker record with in-flight tasks"
            );
        }
        Some(entry.snapshot(name))
    }

    /// Drop `Running` records whose container is not in `present`.
    ///
    /// `Starting` and `Draining` workers are owned by an operation in
    /// progress and are left alone. Returns the dropped names.
    pub fn retain_present(&self, present: &HashSet<WorkerName>) -> Vec<WorkerName> {
        let mut inner = self.lock();
        let gone: Vec<WorkerName> = inner
            .workers
            .iter()
            .filter(|(name, e)| e.status == WorkerStatus::Running && !present.contains(*name))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &gone {
            inner.workers.remove(name);
        }
        gone
    }

    // ── Routing (task router) ───────────────────────────────────────

    /// Pick the next running worker round-robin and open a dispatch on it.
    ///
    /// The in-flight increment and the handle registration happen in the
    /// same critical section as the status check, so a worker that is
    /// draining can never be chosen.
    pub fn assign_next(&self) -> StateResult<Assignment> {
        let mut inner = self.lock();
        let routable: Vec<WorkerName> = inner
            .workers
            .iter()
            .filter(|(_, e)| e.status == WorkerStatus::Running)
            .map(|(name, _)| name.clone())
            .collect();

        let idx = inner.cursor.next(routable.len()).ok_or(StateError::NoCapacity)?;
        let name = routable[idx].clone();

        let dispatch_id = inner.next_dispatch;
        inner.next_dispatch += 1;

        let entry = inner
            .workers
            .get_mut(&name)
            .ok_or_else(|| StateError::UnknownWorker(name.clone()))?;
        entry.inflight += 1;
        entry.outstanding.insert(dispatch_id);
        entry.load_tx.send_replace(entry.inflight);

        Ok(Assignment {
            worker: name,
            address: entry.address.clone(),
            dispatch_id,
        })
    }

    /// Close a dispatch: decrement the count and drop the handle.
    ///
    /// Safe to call after the worker was removed. The count never goes
    /// below zero.
    pub fn complete_dispatch(&self, name: &str, dispatch_id: DispatchId) {
        let mut inner = self.lock();
        let Some(entry) = inner.workers.get_mut(name) else {
            debug!(worker = %name, dispatch_id, "dispatch completed for unknown worker");
            return;
        };
        if !entry.outstanding.remove(&dispatch_id) {
            warn!(worker = %name, dispatch_id, "dispatch completed twice or never opened");
            return;
        }
        entry.inflight = entry.inflight.saturating_sub(1);
        entry.load_tx.send_replace(entry.inflight);
    }

    // ── Draining (drain controller) ─────────────────────────────────

    /// Move a `Running` worker to `Draining` and subscribe to its load.
    pub fn begin_drain(&self, name: &str) -> StateResult<DrainWatch> {
        let mut inner = self.lock();
        let entry = inner
            .workers
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownWorker(name.to_string()))?;
        if entry.status != WorkerStatus::Running {
            return Err(StateError::InvalidTransition {
                name: name.to_string(),
                status: entry.status,
                expected: WorkerStatus::Running,
            });
        }
        entry.status = WorkerStatus::Draining;
        Ok(DrainWatch {
            inflight: entry.inflight,
            outstanding: entry.outstanding.len(),
            changes: entry.load_tx.subscribe(),
        })
    }

    /// Final locked re-check of a draining worker.
    ///
    /// Idle: the worker becomes `Removed` and `true` is returned. Busy:
    /// the worker goes back to `Running` and `false` is returned.
    pub fn finish_drain(&self, name: &str) -> StateResult<bool> {
        let mut inner = self.lock();
        let entry = inner
            .workers
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownWorker(name.to_string()))?;
        if entry.status != WorkerStatus::Draining {
            return Err(StateError::InvalidTransition {
                name: name.to_string(),
                status: entry.status,
                expected: WorkerStatus::Draining,
            });
        }
        if entry.is_idle() {
            entry.status = WorkerStatus::Removed;
            Ok(true)
        } else {
            entry.status = WorkerStatus::Running;
            Ok(false)
        }
    }

    /// Return a `Draining` or `Removed` worker to `Running`.
    pub fn restore_running(&self, name: &str) -> StateResult<()> {
        let mut inner = self.lock();
        let entry = inner
            .workers
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownWorker(name.to_string()))?;
        if matches!(entry.status, WorkerStatus::Draining | WorkerStatus::Removed) {
            entry.status = WorkerStatus::Running;
        }
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// In-flight count and outstanding handle count of one worker.
    pub fn load(&self, name: &str) -> Option<(u32, usize)> {
        let inner = self.lock();
        inner.workers.get(name).map(|e| (e.inflight, e.outstanding.len()))
    }

    pub fn get(&self, name: &str) -> Option<WorkerSnapshot> {
        let inner = self.lock();
        inner.workers.get(name).map(|e| e.snapshot(name))
    }

    /// All workers, ordered by name.
    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let inner = self.lock();
        inner.workers.iter().map(|(name, e)| e.snapshot(name)).collect()
    }

    /// Workers with the given status, ordered by name.
    pub fn with_status(&self, status: WorkerStatus) -> Vec<WorkerSnapshot> {
        let inner = self.lock();
        inner
            .workers
            .iter()
            .filter(|(_, e)| e.status == status)
            .map(|(name, e)| e.snapshot(name))
            .collect()
    }

    /// Addresses of routable workers, ordered by worker name.
    pub fn running_addresses(&self) -> Vec<String> {
        self.with_status(WorkerStatus::Running)
            .into_iter()
            .map(|w| w.address)
            .collect()
    }

    /// In-flight count per worker.
    pub fn task_counts(&self) -> BTreeMap<WorkerName, u32> {
        let inner = self.lock();
        inner
            .workers
            .iter()
            .map(|(name, e)| (name.clone(), e.inflight))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().workers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet_with_running(names: &[&str]) -> FleetState {
        let fleet = FleetState::new();
        for (i, name) in names.iter().enumerate() {
            let address = format!("10.0.0.{}", i + 2);
            fleet.register_starting(name, &format!("id-{name}"), &address).unwrap();
            fleet.mark_running(name).unwrap();
        }
        fleet
    }

    #[test]
    fn starting_workers_are_not_routable() {
        let fleet = FleetState::new();
        fleet.register_starting("translation_1", "c1", "10.0.0.2").unwrap();

        assert_eq!(fleet.assign_next(), Err(StateError::NoCapacity));
        assert!(fleet.running_addresses().is_empty());

        fleet.mark_running("translation_1").unwrap();
        assert_eq!(fleet.assign_next().unwrap().worker, "translation_1");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let fleet = fleet_with_running(&["translation_1"]);
        let err = fleet.register_starting("translation_1", "c9", "10.0.0.9").unwrap_err();
        assert_eq!(err, StateError::AlreadyRegistered("translation_1".to_string()));
    }

    #[test]
    fn assign_round_robins_over_running_workers() {
        let fleet = fleet_with_running(&["w_1", "w_2", "w_3"]);

        let picked: Vec<String> = (0..6).map(|_| fleet.assign_next().unwrap().worker).collect();
        assert_eq!(picked, vec!["w_1", "w_2", "w_3", "w_1", "w_2", "w_3"]);

        let counts = fleet.task_counts();
        assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![2, 2, 2]);
    }

    #[test]
    fn completion_decrements_and_drops_handle() {
        let fleet = fleet_with_running(&["w_1"]);
        let a = fleet.assign_next().unwrap();
        let b = fleet.assign_next().unwrap();
        assert_ne!(a.dispatch_id, b.dispatch_id);
        assert_eq!(fleet.load("w_1"), Some((2, 2)));

        fleet.complete_dispatch("w_1", a.dispatch_id);
        assert_eq!(fleet.load("w_1"), Some((1, 1)));

        // A second completion of the same handle changes nothing.
        fleet.complete_dispatch("w_1", a.dispatch_id);
        assert_eq!(fleet.load("w_1"), Some((1, 1)));

        fleet.complete_dispatch("w_1", b.dispatch_id);
        assert_eq!(fleet.load("w_1"), Some((0, 0)));
    }

    #[test]
    fn completion_for_removed_worker_is_ignored() {
        let fleet = fleet_with_running(&["w_1"]);
        let a = fleet.assign_next().unwrap();
        fleet.remove("w_1");
        fleet.complete_dispatch("w_1", a.dispatch_id);
        assert!(fleet.is_empty());
    }

    #[test]
    fn draining_worker_receives_no_dispatch() {
        let fleet = fleet_with_running(&["w_1", "w_2"]);
        fleet.begin_drain("w_2").unwrap();

        for _ in 0..4 {
            assert_eq!(fleet.assign_next().unwrap().worker, "w_1");
        }
        assert_eq!(fleet.load("w_2"), Some((0, 0)));
    }

    #[test]
    fn finish_drain_checks_load() {
        let fleet = fleet_with_running(&["w_1", "w_2"]);
        let a = fleet.assign_next().unwrap();
        assert_eq!(a.worker, "w_1");

        fleet.begin_drain("w_1").unwrap();
        assert!(!fleet.finish_drain("w_1").unwrap());
        assert_eq!(fleet.get("w_1").unwrap().status, WorkerStatus::Running);

        fleet.complete_dispatch("w_1", a.dispatch_id);
        fleet.begin_drain("w_1").unwrap();
        assert!(fleet.finish_drain("w_1").unwrap());
        assert_eq!(fleet.get("w_1").unwrap().status, WorkerStatus::Removed);
    }

    #[test]
    fn begin_drain_requires_running() {
        let fleet = FleetState::new();
        fleet.register_starting("w_1", "c1", "10.0.0.2").unwrap();
        assert!(matches!(
            fleet.begin_drain("w_1"),
            Err(StateError::InvalidTransition { status: WorkerStatus::Starting, .. })
        ));
        assert!(matches!(fleet.begin_drain("nope"), Err(StateError::UnknownWorker(_))));
    }

    #[tokio::test]
    async fn drain_watch_sees_completions() {
        let fleet = fleet_with_running(&["w_1"]);
        let a = fleet.assign_next().unwrap();

        let mut watch = fleet.begin_drain("w_1").unwrap();
        assert_eq!(watch.inflight, 1);

        let f = fleet.clone();
        tokio::spawn(async move {
            f.complete_dispatch("w_1", a.dispatch_id);
        });

        watch.changes.changed().await.unwrap();
        assert_eq!(*watch.changes.borrow(), 0);
    }

    #[test]
    fn adopt_and_retain_present() {
        let fleet = fleet_with_running(&["w_1"]);
        assert!(fleet.adopt("w_2", "c2", "10.0.0.3"));
        assert!(!fleet.adopt("w_2", "c2", "10.0.0.3"));
        fleet.register_starting("w_3", "c3", "10.0.0.4").unwrap();

        let present: HashSet<String> = ["w_2".to_string()].into_iter().collect();
        let gone = fleet.retain_present(&present);

        // w_1 vanished from the runtime; w_3 is mid-start and kept.
        assert_eq!(gone, vec!["w_1".to_string()]);
        assert!(fleet.contains("w_2"));
        assert!(fleet.contains("w_3"));
    }

    #[test]
    fn target_latest_value_wins() {
        let fleet = FleetState::new();
        assert!(fleet.target().is_none());
        fleet.set_target(ReplicaTarget { count: 3, image: "translation".into() });
        fleet.set_target(ReplicaTarget { count: 1, image: "translation".into() });
        assert_eq!(fleet.target().unwrap().count, 1);
    }

    #[test]
    fn running_addresses_follow_name_order() {
        let fleet = fleet_with_running(&["w_2", "w_1"]);
        // w_2 got 10.0.0.2, w_1 got 10.0.0.3.
        assert_eq!(fleet.running_addresses(), vec!["10.0.0.3", "10.0.0.2"]);
    }
}
