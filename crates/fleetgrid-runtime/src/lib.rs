//! fleetgrid-runtime: the container runtime port.
//!
//! The fleet manager never talks to Docker directly. It drives the
//! `ContainerRuntime` trait, which has two implementations:
//!
//! - **`docker`**: `DockerRuntime`, backed by [bollard](https://docs.rs/bollard)
//! - **`fake`**: `FakeRuntime`, an in-memory runtime for tests
//!
//! # Required capabilities
//!
//! | Operation | Docker call |
//! |---|---|
//! | `list_running(image)` | `GET /containers/json?filters={"ancestor":[image],"status":["running"]}` |
//! | `create_and_start(spec)` | `POST /containers/create` + `POST /containers/{id}/start` |
//! | `inspect_address(id)` | `GET /containers/{id}/json`, network IP |
//! | `stop(id)` | `POST /containers/{id}/stop` |
//! | `remove(id)` | `DELETE /containers/{id}` |

pub mod docker;
pub mod error;
pub mod fake;
pub mod spec;

use async_trait::async_trait;

pub use docker::DockerRuntime;
pub use error::{RuntimeError, RuntimeResult};
pub use fake::FakeRuntime;
pub use spec::{ContainerInfo, ContainerSpec};

/// Container lifecycle operations the fleet manager depends on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Running containers created from `image`.
    async fn list_running(&self, image: &str) -> RuntimeResult<Vec<ContainerInfo>>;

    /// Create and start a container; returns its id.
    async fn create_and_start(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    /// Address of a container on the managed network.
    async fn inspect_address(&self, id: &str) -> RuntimeResult<String>;

    async fn stop(&self, id: &str) -> RuntimeResult<()>;

    async fn remove(&self, id: &str) -> RuntimeResult<()>;
}
