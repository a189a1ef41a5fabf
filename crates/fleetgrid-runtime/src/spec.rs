//! Container creation spec and listing record.

/// What to run for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Network the container joins.
    pub network: String,
    /// Port exposed inside the container (`{port}/tcp`).
    pub service_port: u16,
    /// Environment in `KEY=value` form.
    pub env: Vec<String>,
    /// Bind mounts in `host:container[:mode]` form.
    pub volumes: Vec<String>,
    pub working_dir: Option<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            network: "bridge".to_string(),
            service_port: 5004,
            env: Vec::new(),
            volumes: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_service_port(mut self, port: u16) -> Self {
        self.service_port = port;
        self
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_volumes(mut self, volumes: Vec<String>) -> Self {
        self.volumes = volumes;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<String>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Docker port key for the service port.
    pub fn port_key(&self) -> String {
        format!("{}/tcp", self.service_port)
    }
}

/// A running container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    /// Address on the managed network, when the listing carries it.
    pub address: Option<String>,
    /// Creation time, Unix seconds.
    pub created: i64,
}
