//! Global configuration parsing, validation, and CLI overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Path prefix appended to a bare `host:port` manager address.
pub const MANAGER_API_PREFIX: &str = "/cm_manager/v1.0";

/// Control port allocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct PortConfig {
    /// Allocation starts scanning at `base + 1`.
    pub base: u16,
    /// Maximum number of candidate ports probed per allocation.
    pub scan_limit: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            base: 7877,
            scan_limit: 1000,
        }
    }
}

/// Settings describing the in-container checkpoint/restore daemon.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DaemonConfig {
    /// Fixed port the daemon listens on inside the container.
    pub internal_port: u16,
    /// Command the container is started with.
    pub command: String,
    /// In-container path where the service directory is bind-mounted.
    pub mount_target: String,
    /// Upper bound on a single `/run` or `/checkpoint` call.
    pub request_timeout_seconds: u64,
    /// Upper bound on waiting for the status byte.
    pub status_read_timeout_ms: u64,
    /// Capabilities granted to every container regardless of the request.
    pub required_caps: Vec<String>,
    /// Security option relaxations required for checkpoint/restore.
    pub security_opts: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            internal_port: 7878,
            command: "ff_daemon".into(),
            mount_target: "/opt/controller".into(),
            request_timeout_seconds: 300,
            status_read_timeout_ms: 1000,
            required_caps: vec!["cap_sys_ptrace".into(), "cap_checkpoint_restore".into()],
            security_opts: vec![
                "systempaths=unconfined".into(),
                "apparmor=unconfined".into(),
            ],
        }
    }
}

impl DaemonConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Status read timeout as a [`Duration`].
    #[must_use]
    pub fn status_read_timeout(&self) -> Duration {
        Duration::from_millis(self.status_read_timeout_ms)
    }
}

/// Heartbeat cadence towards the fleet manager.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct HeartbeatConfig {
    /// Seconds between two heartbeats.
    pub interval_seconds: u64,
    /// Per-request timeout.
    pub timeout_seconds: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3,
            timeout_seconds: 2,
        }
    }
}

/// Which container runtime adapter to use.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// Shell out to the runtime CLI.
    #[default]
    Cli,
    /// Talk to the Docker Engine HTTP API.
    Engine,
}

/// Container runtime adapter settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct RuntimeConfig {
    /// Adapter selection.
    pub kind: RuntimeKind,
    /// CLI binary used by the `cli` adapter.
    pub binary: String,
    /// Engine API base URL used by the `engine` adapter.
    pub engine_url: String,
    /// Upper bound on a single runtime operation.
    pub command_timeout_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::Cli,
            binary: "docker".into(),
            engine_url: "http://127.0.0.1:2375".into(),
            command_timeout_seconds: 120,
        }
    }
}

impl RuntimeConfig {
    /// Command timeout as a [`Duration`].
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

fn default_http_port() -> u16 {
    8787
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_services_dir() -> PathBuf {
    PathBuf::from("services")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Identity reported to the fleet manager.
    #[serde(default)]
    pub worker_id: String,
    /// Base URL of the fleet manager API.
    #[serde(default)]
    pub manager_url: String,
    /// Port of the control API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Address the control API binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Root directory holding one subdirectory per service.
    #[serde(default = "default_services_dir")]
    pub services_dir: PathBuf,
    /// Control port allocation.
    #[serde(default)]
    pub ports: PortConfig,
    /// In-container daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Heartbeat settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Container runtime adapter settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            worker_id: String::new(),
            manager_url: String::new(),
            http_port: default_http_port(),
            bind_address: default_bind_address(),
            services_dir: default_services_dir(),
            ports: PortConfig::default(),
            daemon: DaemonConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load configuration from a TOML file path.
    ///
    /// Validation is deferred to [`GlobalConfig::validate`] so CLI overrides
    /// can fill in the worker identity and manager address first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.manager_url = normalize_manager_url(&config.manager_url);
        Ok(config)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn apply_overrides(
        &mut self,
        worker_id: Option<String>,
        manager: Option<String>,
        http_port: Option<u16>,
    ) {
        if let Some(worker_id) = worker_id {
            self.worker_id = worker_id;
        }
        if let Some(manager) = manager {
            self.manager_url = normalize_manager_url(&manager);
        }
        if let Some(port) = http_port {
            self.http_port = port;
        }
    }

    /// Full URL of the manager's heartbeat endpoint.
    #[must_use]
    pub fn heartbeat_url(&self) -> String {
        format!("{}/heartbeat", self.manager_url.trim_end_matches('/'))
    }

    /// Validate the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.worker_id.trim().is_empty() {
            return Err(AppError::Config("worker_id must not be empty".into()));
        }
        if self.manager_url.is_empty() {
            return Err(AppError::Config("manager_url must not be empty".into()));
        }
        if self.ports.scan_limit == 0 {
            return Err(AppError::Config(
                "ports.scan_limit must be greater than zero".into(),
            ));
        }
        if self.ports.base == u16::MAX {
            return Err(AppError::Config(
                "ports.base leaves no room for allocation".into(),
            ));
        }
        if self.heartbeat.interval_seconds == 0 {
            return Err(AppError::Config(
                "heartbeat.interval_seconds must be greater than zero".into(),
            ));
        }
        if self.daemon.command.trim().is_empty() {
            return Err(AppError::Config("daemon.command must not be empty".into()));
        }
        Ok(())
    }
}

/// Turn a bare `host:port` into the manager API base URL.
///
/// Values that already carry a scheme are only stripped of trailing slashes.
#[must_use]
pub fn normalize_manager_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}{MANAGER_API_PREFIX}")
    }
}
