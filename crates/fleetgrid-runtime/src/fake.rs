//! In-memory `ContainerRuntime` for tests.
//!
//! Containers get sequential ids (`fake-1`, `fake-2`, ...) and addresses
//! (`172.18.0.2`, `172.18.0.3`, ...). Individual operations can be made to
//! fail per container name, and the whole runtime can be made unreachable.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{RuntimeError, RuntimeResult};
use crate::spec::{ContainerInfo, ContainerSpec};
use crate::ContainerRuntime;

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    image: String,
    address: String,
    running: bool,
    created: i64,
}

#[derive(Default)]
struct FakeInner {
    containers: Vec<FakeContainer>,
    next_id: u64,
    unavailable: bool,
    fail_create: HashSet<String>,
    fail_stop: HashSet<String>,
    created: Vec<ContainerSpec>,
    stopped: Vec<String>,
    removed: Vec<String>,
}

/// Scriptable in-memory container runtime.
#[derive(Default)]
pub struct FakeRuntime {
    inner: Mutex<FakeInner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeInner> {
        self.inner.lock().expect("fake runtime lock")
    }

    fn insert(inner: &mut FakeInner, name: &str, image: &str) -> FakeContainer {
        inner.next_id += 1;
        let container = FakeContainer {
            id: format!("fake-{}", inner.next_id),
            name: name.to_string(),
            image: image.to_string(),
            address: format!("172.18.0.{}", inner.next_id + 1),
            running: true,
            created: inner.next_id as i64,
        };
        inner.containers.push(container.clone());
        container
    }

    /// Add a running container as if started outside the controller.
    pub fn seed(&self, image: &str, name: &str) -> ContainerInfo {
        let mut inner = self.lock();
        let c = Self::insert(&mut inner, name, image);
        ContainerInfo {
            id: c.id,
            name: c.name,
            address: Some(c.address),
            created: c.created,
        }
    }

    /// Make every call fail with `RuntimeError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn fail_create(&self, name: &str) {
        self.lock().fail_create.insert(name.to_string());
    }

    pub fn fail_stop(&self, name: &str) {
        self.lock().fail_stop.insert(name.to_string());
    }

    /// Simulate a container exiting on its own.
    pub fn crash(&self, name: &str) {
        let mut inner = self.lock();
        if let Some(c) = inner.containers.iter_mut().find(|c| c.name == name) {
            c.running = false;
        }
    }

    /// Names of running containers for `image`, sorted.
    pub fn running_names(&self, image: &str) -> Vec<String> {
        let inner = self.lock();
        let mut names: Vec<String> = inner
            .containers
            .iter()
            .filter(|c| c.running && c.image == image)
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Specs passed to `create_and_start`, in call order.
    pub fn created(&self) -> Vec<ContainerSpec> {
        self.lock().created.clone()
    }

    /// Names of containers passed to `stop`, in call order.
    pub fn stopped(&self) -> Vec<String> {
        self.lock().stopped.clone()
    }

    /// Names of containers passed to `remove`, in call order.
    pub fn removed(&self) -> Vec<String> {
        self.lock().removed.clone()
    }

    fn check_available(inner: &FakeInner) -> RuntimeResult<()> {
        if inner.unavailable {
            return Err(RuntimeError::Unavailable("fake runtime offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_running(&self, image: &str) -> RuntimeResult<Vec<ContainerInfo>> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner
            .containers
            .iter()
            .filter(|c| c.running && c.image == image)
            .map(|c| ContainerInfo {
                id: c.id.clone(),
                name: c.name.clone(),
                address: Some(c.address.clone()),
                created: c.created,
            })
            .collect())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        inner.created.push(spec.clone());
        if inner.fail_create.contains(&spec.name) {
            return Err(RuntimeError::operation("create", &spec.name, "scripted failure"));
        }
        if inner.containers.iter().any(|c| c.name == spec.name) {
            return Err(RuntimeError::operation("create", &spec.name, "name already in use"));
        }
        Ok(Self::insert(&mut inner, &spec.name, &spec.image).id)
    }

    async fn inspect_address(&self, id: &str) -> RuntimeResult<String> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        inner
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.address.clone())
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    async fn stop(&self, id: &str) -> RuntimeResult<()> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        let idx = inner
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        let name = inner.containers[idx].name.clone();
        if inner.fail_stop.contains(&name) {
            return Err(RuntimeError::operation("stop", &name, "scripted failure"));
        }
        inner.containers[idx].running = false;
        inner.stopped.push(name);
        Ok(())
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        let idx = inner
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        let container = inner.containers.remove(idx);
        inner.removed.push(container.name);
        Ok(())
    }
}
