//! fleetd.toml configuration parser.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a controller for the `translation` image on the
//! `aibt_network` Docker network with the worker service on port 5004.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::duration::parse_duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    pub probe: ProbeConfig,
    pub pools: PoolsConfig,
    pub drain: DrainConfig,
    pub scaler: ScalerConfig,
    pub proxy: ProxyConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the control API binds to.
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5003".to_string(),
        }
    }
}

/// How worker containers are created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Image managed when no `update_containers` call has named one yet.
    pub image: String,
    /// Docker network the workers join; addresses are read from it.
    pub network: String,
    /// Fixed port the worker service listens on inside the container.
    pub service_port: u16,
    pub env: BTreeMap<String, String>,
    /// Bind mounts in `host:container[:mode]` form.
    pub volumes: Vec<String>,
    pub working_dir: Option<String>,
    /// Grace period handed to `docker stop`.
    pub stop_timeout: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image: "translation".to_string(),
            network: "aibt_network".to_string(),
            service_port: 5004,
            env: BTreeMap::new(),
            volumes: Vec::new(),
            working_dir: None,
            stop_timeout: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub retries: u32,
    pub delay: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            delay: "3s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
    /// Maximum concurrent container starts during scale-up.
    pub startup: usize,
    /// Number of tasks posting jobs to workers.
    pub dispatch_workers: usize,
    /// Capacity of the dispatch job channel.
    pub dispatch_queue: usize,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            startup: 10,
            dispatch_workers: 10,
            dispatch_queue: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Upper bound on each wait for a dispatch completion.
    pub poll_interval: String,
    /// Give up draining (and keep the worker) after this long.
    pub timeout: String,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_interval: "1s".to_string(),
            timeout: "1h".to_string(),
        }
    }
}

/// Background reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// How often the last replica target is re-applied. `0s` disables it.
    pub resync_interval: String,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            resync_interval: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub config_path: String,
    /// Program and arguments run after the config is written. Empty skips
    /// the reload.
    pub reload_command: Vec<String>,
    pub listen_port: u16,
    pub upstream_name: String,
    /// Connect/send/read timeouts written into the location block.
    pub timeout: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: "/app/nginx/nginx.conf".to_string(),
            reload_command: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            listen_port: 80,
            upstream_name: "backend".to_string(),
            timeout: "3600s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Path of the worker's task endpoint.
    pub task_path: String,
    pub request_timeout: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            task_path: "/sleep".to_string(),
            request_timeout: "3600s".to_string(),
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FleetConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.image.trim().is_empty() {
            anyhow::bail!("runtime.image must not be empty");
        }
        if self.pools.startup == 0 || self.pools.dispatch_workers == 0 || self.pools.dispatch_queue == 0 {
            anyhow::bail!("pool sizes must be at least 1");
        }
        for (field, value) in [
            ("runtime.stop_timeout", &self.runtime.stop_timeout),
            ("probe.delay", &self.probe.delay),
            ("drain.poll_interval", &self.drain.poll_interval),
            ("drain.timeout", &self.drain.timeout),
            ("scaler.resync_interval", &self.scaler.resync_interval),
            ("proxy.timeout", &self.proxy.timeout),
            ("worker.request_timeout", &self.worker.request_timeout),
        ] {
            if parse_duration(value).is_none() {
                anyhow::bail!("{field}: invalid duration {value:?}");
            }
        }
        Ok(())
    }
}

impl RuntimeConfig {
    pub fn stop_timeout(&self) -> Duration {
        parse_duration(&self.stop_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Environment in the `KEY=value` form the container runtime expects.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

impl ProbeConfig {
    pub fn delay(&self) -> Duration {
        parse_duration(&self.delay).unwrap_or(Duration::from_secs(3))
    }
}

impl DrainConfig {
    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(1))
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(3600))
    }
}

impl ScalerConfig {
    /// `None` when periodic resync is disabled.
    pub fn resync_interval(&self) -> Option<Duration> {
        parse_duration(&self.resync_interval).filter(|d| !d.is_zero())
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(3600))
    }
}

impl WorkerConfig {
    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: FleetConfig = toml::from_str("").unwrap();
        assert_eq!(config.runtime.image, "translation");
        assert_eq!(config.runtime.service_port, 5004);
        assert_eq!(config.server.listen, "0.0.0.0:5003");
        assert_eq!(config.probe.retries, 5);
        assert_eq!(config.probe.delay(), Duration::from_secs(3));
        assert_eq!(config.proxy.reload_command, vec!["nginx", "-s", "reload"]);
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
[runtime]
image = "whisper"
network = "asr_net"
volumes = ["/srv/audio:/mnt/input_audio_files:rw"]

[runtime.env]
DB_HOST = "mysql"
DB_PORT = "3306"

[drain]
poll_interval = "250ms"
"#;
        let config: FleetConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runtime.image, "whisper");
        assert_eq!(config.runtime.service_port, 5004);
        assert_eq!(config.runtime.env_list(), vec!["DB_HOST=mysql", "DB_PORT=3306"]);
        assert_eq!(config.drain.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.drain.timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn validate_rejects_bad_duration() {
        let mut config = FleetConfig::default();
        config.drain.timeout = "forever".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("drain.timeout"));
    }

    #[test]
    fn zero_resync_interval_disables_resync() {
        let mut config = FleetConfig::default();
        assert_eq!(config.scaler.resync_interval(), Some(Duration::from_secs(30)));
        config.scaler.resync_interval = "0s".to_string();
        assert_eq!(config.scaler.resync_interval(), None);
        config.validate().unwrap();
    }

    #[test]
    fn empty_reload_command_is_valid() {
        let config: FleetConfig = toml::from_str("[proxy]\nreload_command = []\n").unwrap();
        assert!(config.proxy.reload_command.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_pools() {
        let mut config = FleetConfig::default();
        config.pools.dispatch_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_round_trips_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetd.toml");
        std::fs::write(&path, FleetConfig::default().to_toml_string().unwrap()).unwrap();

        let config = FleetConfig::from_file(&path).unwrap();
        assert_eq!(config.proxy.config_path, "/app/nginx/nginx.conf");
        assert_eq!(config.worker.task_path, "/sleep");
    }
}
