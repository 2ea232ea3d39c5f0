#![forbid(unsafe_code)]

//! `cm-controller`: per-host agent for checkpoint/restore containers.
//!
//! Bootstraps configuration, recovers services left by a previous run,
//! starts the heartbeat towards the fleet manager and serves the control API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use cm_controller::api::{self, AppState};
use cm_controller::config::GlobalConfig;
use cm_controller::heartbeat;
use cm_controller::orchestrator::lifecycle::LifecycleController;
use cm_controller::persistence::service_dir::ServiceDirs;
use cm_controller::ports::PortAllocator;
use cm_controller::proxy::CommandProxy;
use cm_controller::registry::ServiceRegistry;
use cm_controller::runtime::build_runtime;
use cm_controller::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "cm-controller", about = "Checkpoint/restore container agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker identifier reported to the manager.
    #[arg(short, long)]
    worker: Option<String>,

    /// Manager address (`host:port` or full base URL).
    #[arg(short, long)]
    manager: Option<String>,

    /// Control API port.
    #[arg(long)]
    port: Option<u16>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("cm-controller bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_overrides(args.worker, args.manager, args.port);
    config.validate()?;
    let config = Arc::new(config);
    info!(worker_id = %config.worker_id, manager = %config.manager_url, "configuration loaded");

    // ── Prepare services root ───────────────────────────
    let dirs = ServiceDirs::new(&config.services_dir);
    dirs.create_root().await?;

    // ── Build components ────────────────────────────────
    let runtime = build_runtime(&config.runtime)?;
    let registry = Arc::new(ServiceRegistry::new(dirs));
    let ports = Arc::new(PortAllocator::new(config.ports.scan_limit));
    let lifecycle = Arc::new(LifecycleController::new(
        Arc::clone(&registry),
        ports,
        runtime,
        &config,
    ));
    let proxy = CommandProxy::new(registry, config.daemon.request_timeout())?;

    // ── Recover services from a previous run ────────────
    match lifecycle.recover_at_startup().await {
        Ok(recovered) => info!(count = recovered.len(), "startup recovery complete"),
        Err(err) => warn!(%err, "startup recovery failed, starting with an empty registry"),
    }

    // ── Heartbeat ───────────────────────────────────────
    let ct = CancellationToken::new();
    let heartbeat_handle = heartbeat::spawn_heartbeat_task(
        heartbeat::heartbeat_client(Duration::from_secs(config.heartbeat.timeout_seconds))?,
        config.heartbeat_url(),
        config.worker_id.clone(),
        Duration::from_secs(config.heartbeat.interval_seconds),
        ct.clone(),
    );

    // ── Control API ─────────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        lifecycle,
        proxy,
    });
    let api_ct = ct.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(state, api_ct.clone()).await {
            error!(%err, "control API failed");
            api_ct.cancel();
        }
    });

    info!("cm-controller ready");

    // ── Wait for shutdown ───────────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => warn!("shutting down after control API failure"),
    }
    ct.cancel();

    let _ = tokio::join!(api_handle, heartbeat_handle);
    info!("cm-controller shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
