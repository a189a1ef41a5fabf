//! fleetd: the FleetGrid daemon.
//!
//! Single binary that assembles the controller:
//! - Fleet state (in memory)
//! - Docker runtime
//! - Readiness prober
//! - Fleet manager + periodic resync
//! - Task router + dispatch pool
//! - nginx config writer
//! - Control API
//!
//! # Usage
//!
//! ```text
//! fleetd run --config /etc/fleetd.toml --initial-replicas 2
//! fleetd config > fleetd.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fleet_core::FleetConfig;
use fleetgrid_api::{ApiState, build_router};
use fleetgrid_dispatch::{DispatchPool, HttpTaskClient, TaskRouter};
use fleetgrid_health::TcpReadiness;
use fleetgrid_proxy::{NginxSettings, ProxyPublisher};
use fleetgrid_runtime::DockerRuntime;
use fleetgrid_scaler::{DrainController, FleetManager, ManagerSettings};
use fleetgrid_state::FleetState;

const DEFAULT_LOG_FILTER: &str = "info,fleetd=debug,fleetgrid=debug";

#[derive(Parser)]
#[command(name = "fleetd", about = "FleetGrid container fleet controller")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "FLEETD_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control API and manage the fleet.
    Run {
        /// Path to fleetd.toml. Defaults apply when omitted.
        #[arg(long, env = "FLEETD_CONFIG")]
        config: Option<PathBuf>,

        /// Override `server.listen`.
        #[arg(long, env = "FLEETD_LISTEN")]
        listen: Option<String>,

        /// Override `runtime.image`.
        #[arg(long, env = "FLEETD_IMAGE")]
        image: Option<String>,

        /// Reconcile to this many workers before serving.
        #[arg(long, env = "FLEETD_INITIAL_REPLICAS")]
        initial_replicas: Option<u32>,
    },
    /// Print the default configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            listen,
            image,
            initial_replicas,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            if let Some(image) = image {
                config.runtime.image = image;
            }
            config.validate()?;
            run(config, initial_replicas).await
        }
        Command::Config => {
            print!("{}", FleetConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<FleetConfig> {
    match path {
        Some(path) => FleetConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(FleetConfig::default()),
    }
}

async fn run(config: FleetConfig, initial_replicas: Option<u32>) -> anyhow::Result<()> {
    info!(image = %config.runtime.image, network = %config.runtime.network, "fleetd starting");

    // ── Initialize subsystems ──────────────────────────────────

    let fleet = FleetState::new();

    let runtime = Arc::new(DockerRuntime::connect(
        config.runtime.network.clone(),
        config.runtime.stop_timeout(),
    )?);
    info!("docker runtime connected");

    let readiness = Arc::new(TcpReadiness::new(config.probe.retries, config.probe.delay()));

    let publisher = Arc::new(ProxyPublisher::with_command(NginxSettings {
        config_path: PathBuf::from(&config.proxy.config_path),
        reload_command: config.proxy.reload_command.clone(),
        listen_port: config.proxy.listen_port,
        upstream_name: config.proxy.upstream_name.clone(),
        upstream_port: config.runtime.service_port,
        timeout: config.proxy.timeout(),
    }));

    let client = Arc::new(HttpTaskClient::new(
        config.runtime.service_port,
        config.worker.task_path.clone(),
        config.worker.request_timeout(),
    ));
    let pool = Arc::new(DispatchPool::start(
        fleet.clone(),
        client,
        config.pools.dispatch_workers,
        config.pools.dispatch_queue,
    ));
    let router = TaskRouter::new(fleet.clone(), pool.clone());

    let drain = DrainController::new(fleet.clone(), config.drain.poll_interval(), config.drain.timeout());
    let manager = Arc::new(FleetManager::new(
        runtime,
        readiness,
        publisher,
        fleet.clone(),
        drain,
        ManagerSettings::from_config(&config),
    ));

    if let Some(count) = initial_replicas {
        match manager.reconcile(count, &config.runtime.image).await {
            Ok(addresses) => info!(running = addresses.len(), "initial reconciliation finished"),
            Err(e) => error!(error = %e, "initial reconciliation failed"),
        }
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let resync_handle = match config.scaler.resync_interval() {
        Some(interval) => {
            let manager = manager.clone();
            Some(tokio::spawn(manager.run(interval, shutdown_rx)))
        }
        None => {
            info!("periodic resync disabled");
            None
        }
    };

    // ── Start API server ───────────────────────────────────────

    let app = build_router(ApiState {
        fleet,
        router,
        manager,
        default_image: config.runtime.image.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    info!(addr = %config.server.listen, "control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Deliver whatever was already queued.
    pool.shutdown().await;
    if let Some(handle) = resync_handle {
        let _ = handle.await;
    }

    info!("fleetd stopped");
    Ok(())
}
