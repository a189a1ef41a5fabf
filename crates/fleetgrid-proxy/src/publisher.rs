//! Atomic config write and proxy reload.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{ProxyError, ProxyResult};
use crate::nginx::{render, NginxSettings};

/// Makes the proxy pick up a freshly written config.
#[async_trait]
pub trait Reloader: Send + Sync {
    async fn reload(&self) -> ProxyResult<()>;
}

/// Runs a command such as `nginx -s reload`.
#[derive(Debug, Clone)]
pub struct CommandReloader {
    command: Vec<String>,
}

impl CommandReloader {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Reloader for CommandReloader {
    async fn reload(&self) -> ProxyResult<()> {
        let Some((program, args)) = self.command.split_first() else {
            debug!("no reload command configured");
            return Ok(());
        };
        let display = self.command.join(" ");

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| ProxyError::Reload {
                command: display.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProxyError::Reload {
                command: display,
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

/// Publishes the set of routable worker addresses.
#[async_trait]
pub trait UpstreamPublisher: Send + Sync {
    async fn publish(&self, addresses: &[String]) -> ProxyResult<()>;
}

/// Writes the nginx config and reloads nginx.
pub struct ProxyPublisher {
    settings: NginxSettings,
    reloader: Box<dyn Reloader>,
}

impl ProxyPublisher {
    pub fn new(settings: NginxSettings, reloader: Box<dyn Reloader>) -> Self {
        Self { settings, reloader }
    }

    /// Publisher using the configured reload command.
    pub fn with_command(settings: NginxSettings) -> Self {
        let reloader = CommandReloader::new(settings.reload_command.clone());
        Self::new(settings, Box::new(reloader))
    }

    pub fn settings(&self) -> &NginxSettings {
        &self.settings
    }
}

/// Write `contents` to a sibling temp file and rename it over `path`.
async fn write_atomic(path: &Path, contents: &str) -> ProxyResult<()> {
    let write_err = |source| ProxyError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_err)
}

#[async_trait]
impl UpstreamPublisher for ProxyPublisher {
    async fn publish(&self, addresses: &[String]) -> ProxyResult<()> {
        let conf = render(addresses, &self.settings);
        write_atomic(&self.settings.config_path, &conf).await?;
        debug!(path = %self.settings.config_path.display(), "proxy config written");

        self.reloader.reload().await?;
        info!(upstreams = addresses.len(), "proxy config published");
        Ok(())
    }
}
