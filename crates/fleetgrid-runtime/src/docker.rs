//! Docker backend using the bollard crate.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StopContainerOptions,
};
use bollard::models::{ContainerSummary, HostConfig, PortBinding};
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::spec::{ContainerInfo, ContainerSpec};
use crate::ContainerRuntime;

/// `ContainerRuntime` backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
    /// Network whose IP is reported as the worker address.
    network: String,
    stop_timeout: Duration,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon (socket or `DOCKER_HOST`).
    pub fn connect(network: impl Into<String>, stop_timeout: Duration) -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(format!("failed to connect: {e}")))?;
        Ok(Self::from_docker(docker, network, stop_timeout))
    }

    pub fn from_docker(docker: Docker, network: impl Into<String>, stop_timeout: Duration) -> Self {
        Self {
            docker,
            network: network.into(),
            stop_timeout,
        }
    }
}

/// Convert a listing entry, reading the address on `network`.
fn summary_to_info(network: &str, summary: ContainerSummary) -> Option<ContainerInfo> {
    let id = summary.id?;
    let name = summary
        .names
        .and_then(|names| names.into_iter().next())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
    let address = summary
        .network_settings
        .and_then(|ns| ns.networks)
        .and_then(|mut nets| nets.remove(network))
        .and_then(|endpoint| endpoint.ip_address)
        .filter(|ip| !ip.is_empty());
    Some(ContainerInfo {
        id,
        name,
        address,
        created: summary.created.unwrap_or_default(),
    })
}

/// Map a bollard error, recognising 404s.
fn map_err(op: &'static str, target: &str, err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
            RuntimeError::NotFound(target.to_string())
        }
        other => RuntimeError::operation(op, target, other),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self, image: &str) -> RuntimeResult<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        filters.insert("ancestor".to_string(), vec![image.to_string()]);
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let options = ListContainersOptions::<String> {
            all: false,
            filters,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("failed to list containers: {e}")))?;

        let containers: Vec<ContainerInfo> = summaries
            .into_iter()
            .filter_map(|s| summary_to_info(&self.network, s))
            .collect();
        debug!(%image, count = containers.len(), "listed running containers");
        Ok(containers)
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let port_key = spec.port_key();

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        // Publish the service port on an ephemeral host port.
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: None,
            }]),
        );

        let host_config = HostConfig {
            binds: if spec.volumes.is_empty() {
                None
            } else {
                Some(spec.volumes.clone())
            },
            network_mode: Some(spec.network.clone()),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            exposed_ports: Some(exposed_ports),
            working_dir: spec.working_dir.clone(),
            tty: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_err("create", &spec.name, e))?;

        if let Err(e) = self.docker.start_container::<String>(&response.id, None).await {
            // Do not leave a created-but-stopped container behind.
            let cleanup = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(rm) = self.docker.remove_container(&response.id, Some(cleanup)).await {
                warn!(container = %spec.name, error = %rm, "failed to clean up unstarted container");
            }
            return Err(map_err("start", &spec.name, e));
        }

        info!(container = %spec.name, id = %response.id, image = %spec.image, "container started");
        Ok(response.id)
    }

    async fn inspect_address(&self, id: &str) -> RuntimeResult<String> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_err("inspect", id, e))?;

        info.network_settings
            .and_then(|ns| ns.networks)
            .and_then(|mut nets| nets.remove(&self.network))
            .and_then(|endpoint| endpoint.ip_address)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| RuntimeError::NoAddress {
                id: id.to_string(),
                network: self.network.clone(),
            })
    }

    async fn stop(&self, id: &str) -> RuntimeResult<()> {
        let options = StopContainerOptions {
            t: self.stop_timeout.as_secs() as i64,
        };
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| map_err("stop", id, e))
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: false,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_err("remove", id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerSummaryNetworkSettings, EndpointSettings};

    fn summary(id: &str, name: &str, network: &str, ip: &str) -> ContainerSummary {
        let mut networks = HashMap::new();
        networks.insert(
            network.to_string(),
            EndpointSettings {
                ip_address: Some(ip.to_string()),
                ..Default::default()
            },
        );
        ContainerSummary {
            id: Some(id.to_string()),
            names: Some(vec![format!("/{name}")]),
            created: Some(1_700_000_000),
            network_settings: Some(ContainerSummaryNetworkSettings {
                networks: Some(networks),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn summary_strips_leading_slash_and_reads_network_ip() {
        let info =
            summary_to_info("aibt_network", summary("abc", "translation_1", "aibt_network", "172.18.0.5"))
                .unwrap();
        assert_eq!(info.id, "abc");
        assert_eq!(info.name, "translation_1");
        assert_eq!(info.address.as_deref(), Some("172.18.0.5"));
        assert_eq!(info.created, 1_700_000_000);
    }

    #[test]
    fn summary_on_other_network_has_no_address() {
        let info =
            summary_to_info("aibt_network", summary("abc", "translation_1", "bridge", "172.17.0.5"))
                .unwrap();
        assert_eq!(info.address, None);
    }

    #[test]
    fn summary_without_id_is_skipped() {
        assert!(summary_to_info("aibt_network", ContainerSummary::default()).is_none());
    }

    #[test]
    fn not_found_is_mapped() {
        let err = map_err(
            "stop",
            "abc",
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message: "No such container".to_string(),
            },
        );
        assert!(matches!(err, RuntimeError::NotFound(id) if id == "abc"));
    }
}
