//! Fleet manager: reconcile the running containers with the replica target.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::FleetConfig;
use fleetgrid_health::Readiness;
use fleetgrid_proxy::UpstreamPublisher;
use fleetgrid_runtime::{ContainerInfo, ContainerRuntime, ContainerSpec};
use fleetgrid_state::{worker_index, worker_name, FleetState, ReplicaTarget, WorkerStatus};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::drain::{DrainController, DrainOutcome};
use crate::error::{ScaleError, ScaleResult};

/// How new worker containers are created.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub network: String,
    pub service_port: u16,
    pub env: Vec<String>,
    pub volumes: Vec<String>,
    pub working_dir: Option<String>,
    /// Maximum number of containers started at once.
    pub startup_pool: usize,
}

impl ManagerSettings {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            network: config.runtime.network.clone(),
            service_port: config.runtime.service_port,
            env: config.runtime.env_list(),
            volumes: config.runtime.volumes.clone(),
            working_dir: config.runtime.working_dir.clone(),
            startup_pool: config.pools.startup,
        }
    }

    fn spec(&self, name: &str, image: &str) -> ContainerSpec {
        ContainerSpec::new(name, image)
            .with_network(self.network.clone())
            .with_service_port(self.service_port)
            .with_env(self.env.clone())
            .with_volumes(self.volumes.clone())
            .with_working_dir(self.working_dir.clone())
    }
}

/// The per-worker operations of a pass, cloned into spawned tasks.
#[derive(Clone)]
struct WorkerOps {
    runtime: Arc<dyn ContainerRuntime>,
    readiness: Arc<dyn Readiness>,
    fleet: FleetState,
    drain: DrainController,
    settings: Arc<ManagerSettings>,
}

impl WorkerOps {
    /// Create, register, probe and promote one worker.
    ///
    /// Returns the worker address once it is `Running`.
    async fn start(self, name: String, image: String) -> Option<String> {
        let spec = self.settings.spec(&name, &image);
        let id = match self.runtime.create_and_start(&spec).await {
            Ok(id) => id,
            Err(e) => {
                error!(worker = %name, %image, error = %e, "failed to start container");
                return None;
            }
        };

        let address = match self.runtime.inspect_address(&id).await {
            Ok(address) => address,
            Err(e) => {
                error!(worker = %name, error = %e, "failed to read container address");
                self.discard(&name, &id).await;
                return None;
            }
        };

        if let Err(e) = self.fleet.register_starting(&name, &id, &address) {
            error!(worker = %name, error = %e, "failed to register worker");
            self.discard(&name, &id).await;
            return None;
        }

        if !self.readiness.wait_ready(&address, self.settings.service_port).await {
            warn!(worker = %name, %address, "worker failed readiness; discarding");
            self.fleet.remove(&name);
            self.discard(&name, &id).await;
            return None;
        }

        match self.fleet.mark_running(&name) {
            Ok(()) => {
                info!(worker = %name, %address, "worker started");
                Some(address)
            }
            Err(e) => {
                error!(worker = %name, error = %e, "failed to promote worker");
                None
            }
        }
    }

    /// Drain one worker and, if it went idle, stop and delete it.
    ///
    /// Returns whether the worker was removed.
    async fn retire(self, name: String) -> bool {
        let container_id = match self.fleet.get(&name) {
            Some(w) => w.container_id,
            None => return false,
        };

        match self.drain.drain(&name).await {
            Ok(DrainOutcome::Drained) => {}
            Ok(DrainOutcome::Retained { inflight }) => {
                info!(worker = %name, inflight, "worker kept");
                return false;
            }
            Err(e) => {
                warn!(worker = %name, error = %e, "cannot drain worker");
                return false;
            }
        }

        if let Err(e) = self.runtime.stop(&container_id).await {
            error!(worker = %name, error = %e, "failed to stop container; keeping worker");
            if let Err(e) = self.fleet.restore_running(&name) {
                warn!(worker = %name, error = %e, "failed to restore worker");
            }
            return false;
        }
        if let Err(e) = self.runtime.remove(&container_id).await {
            error!(worker = %name, error = %e, "failed to remove stopped container");
        }
        self.fleet.remove(&name);
        info!(worker = %name, "worker removed");
        true
    }

    /// Best-effort stop and delete of a container that never became a worker.
    async fn discard(&self, name: &str, id: &str) {
        if let Err(e) = self.runtime.stop(id).await {
            warn!(worker = %name, error = %e, "failed to stop discarded container");
        }
        if let Err(e) = self.runtime.remove(id).await {
            warn!(worker = %name, error = %e, "failed to remove discarded container");
        }
    }
}

/// Drives the fleet toward the replica target.
pub struct FleetManager {
    ops: WorkerOps,
    publisher: Arc<dyn UpstreamPublisher>,
    pass_lock: Mutex<()>,
}

impl FleetManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        readiness: Arc<dyn Readiness>,
        publisher: Arc<dyn UpstreamPublisher>,
        fleet: FleetState,
        drain: DrainController,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            ops: WorkerOps {
                runtime,
                readiness,
                fleet,
                drain,
                settings: Arc::new(settings),
            },
            publisher,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn fleet(&self) -> &FleetState {
        &self.ops.fleet
    }

    /// Record `target_count` replicas of `image` as the target and run one
    /// reconciliation pass.
    ///
    /// Passes are serialized. A pass that had to wait for another applies
    /// whatever target is current when it starts. Returns the addresses
    /// of the running workers afterwards.
    pub async fn reconcile(&self, target_count: u32, image: &str) -> ScaleResult<Vec<String>> {
        let image = image.trim();
        if image.is_empty() {
            return Err(ScaleError::InvalidInput("image name is required".to_string()));
        }
        self.ops.fleet.set_target(ReplicaTarget {
            count: target_count,
            image: image.to_string(),
        });
        self.resync().await
    }

    /// Run one pass against the stored target, if there is one.
    pub async fn resync(&self) -> ScaleResult<Vec<String>> {
        let _pass = self.pass_lock.lock().await;
        let Some(target) = self.ops.fleet.target() else {
            debug!("no replica target yet; nothing to reconcile");
            return Ok(self.ops.fleet.running_addresses());
        };
        self.pass(&target).await
    }

    async fn pass(&self, target: &ReplicaTarget) -> ScaleResult<Vec<String>> {
        let image = target.image.as_str();
        let listed = self
            .ops
            .runtime
            .list_running(image)
            .await
            .map_err(|e| ScaleError::RuntimeUnavailable(e.to_string()))?;
        self.sync_membership(&listed).await;

        let current = self.ops.fleet.with_status(WorkerStatus::Running).len() as i64;
        let difference = i64::from(target.count) - current;
        info!(%image, target = target.count, current, difference, "reconciling fleet");

        if difference > 0 {
            let names = self.next_names(image, &listed, difference as u32);
            self.start_workers(names, image).await;
        } else if difference < 0 {
            self.retire_workers(difference.unsigned_abs() as usize).await;
        }

        match self.ops.runtime.list_running(image).await {
            Ok(listed) => self.sync_membership(&listed).await,
            Err(e) => warn!(error = %e, "post-pass listing failed; publishing known workers"),
        }

        let addresses = self.ops.fleet.running_addresses();
        if let Err(e) = self.publisher.publish(&addresses).await {
            error!(error = %e, "failed to publish proxy config; previous config stays in force");
        }
        info!(%image, running = addresses.len(), "reconciliation finished");
        Ok(addresses)
    }

    /// Adopt listed containers unknown to the fleet and drop running
    /// entries whose container is gone.
    async fn sync_membership(&self, listed: &[ContainerInfo]) {
        let fleet = &self.ops.fleet;
        for container in listed {
            if fleet.contains(&container.name) {
                continue;
            }
            let address = match &container.address {
                Some(address) => address.clone(),
                None => match self.ops.runtime.inspect_address(&container.id).await {
                    Ok(address) => address,
                    Err(e) => {
                        warn!(worker = %container.name, error = %e, "cannot adopt container without address");
                        continue;
                    }
                },
            };
            if fleet.adopt(&container.name, &container.id, &address) {
                info!(worker = %container.name, %address, "adopted running container");
            }
        }

        let present: HashSet<String> = listed.iter().map(|c| c.name.clone()).collect();
        for name in fleet.retain_present(&present) {
            warn!(worker = %name, "container no longer running; dropped from fleet");
        }
    }

    /// `count` fresh names, numbered above every index in use.
    fn next_names(&self, image: &str, listed: &[ContainerInfo], count: u32) -> Vec<String> {
        let highest = self
            .ops
            .fleet
            .snapshot()
            .iter()
            .map(|w| w.name.as_str())
            .chain(listed.iter().map(|c| c.name.as_str()))
            .filter_map(worker_index)
            .max()
            .unwrap_or(0);
        (1..=count).map(|i| worker_name(image, highest + i)).collect()
    }

    async fn start_workers(&self, names: Vec<String>, image: &str) {
        let permits = Arc::new(Semaphore::new(self.ops.settings.startup_pool.max(1)));
        let mut set = JoinSet::new();
        for name in names {
            let ops = self.ops.clone();
            let permits = permits.clone();
            let image = image.to_string();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                ops.start(name, image).await
            });
        }

        let mut started = 0usize;
        let mut failed = 0usize;
        while let Some(result) = set.join_next().await {
            match result {
                Ok(Some(_)) => started += 1,
                Ok(None) => failed += 1,
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "start task panicked");
                }
            }
        }
        info!(started, failed, "scale-up finished");
    }

    /// Drain and remove up to `count` running workers, least busy first and
    /// newest first among equals.
    async fn retire_workers(&self, count: usize) {
        let mut running = self.ops.fleet.with_status(WorkerStatus::Running);
        running.sort_by(|a, b| {
            a.inflight
                .cmp(&b.inflight)
                .then_with(|| worker_index(&b.name).cmp(&worker_index(&a.name)))
                .then_with(|| b.name.cmp(&a.name))
        });
        let candidates: Vec<String> = running.into_iter().take(count).map(|w| w.name).collect();

        let mut set = JoinSet::new();
        for name in candidates {
            let ops = self.ops.clone();
            set.spawn(ops.retire(name));
        }

        let mut removed = 0usize;
        let mut kept = 0usize;
        while let Some(result) = set.join_next().await {
            match result {
                Ok(true) => removed += 1,
                Ok(false) => kept += 1,
                Err(e) => {
                    kept += 1;
                    error!(error = %e, "retire task panicked");
                }
            }
        }
        info!(removed, kept, "scale-down finished");
    }

    /// Re-apply the stored target every `interval` until `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "fleet resync started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.resync().await {
                        error!(error = %e, "fleet resync failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("fleet resync shutting down");
                    break;
                }
            }
        }
    }
}
