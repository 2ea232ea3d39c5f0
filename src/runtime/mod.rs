//! Container runtime capability interface.
//!
//! The [`ContainerRuntime`] trait decouples the lifecycle controller from
//! how the runtime is reached. [`cli::DockerCli`] shells out to the runtime
//! binary; [`engine::EngineApi`] talks to the Engine HTTP API.

pub mod cli;
pub mod engine;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{RuntimeConfig, RuntimeKind};
use crate::models::request::MountSpec;
use crate::{AppError, Result};

/// Boxed future returned by [`ContainerRuntime`] methods.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Coarse container state as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// Created, never started.
    Created,
    /// Running.
    Running,
    /// Frozen by the runtime.
    Paused,
    /// Being restarted.
    Restarting,
    /// Being removed.
    Removing,
    /// Stopped.
    Exited,
    /// Defunct.
    Dead,
    /// Any state string this agent does not know.
    Unknown(String),
}

impl ContainerState {
    /// Parse the runtime's status string (`.State.Status`).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// Whether the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl Display for ContainerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Running => f.write_str("running"),
            Self::Paused => f.write_str("paused"),
            Self::Restarting => f.write_str("restarting"),
            Self::Removing => f.write_str("removing"),
            Self::Exited => f.write_str("exited"),
            Self::Dead => f.write_str("dead"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Runtime identifier.
    pub id: String,
    /// Container name without the leading slash.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Raw runtime state string.
    pub state: String,
}

/// A parsed `[ip:]host:container[/proto]` port publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Host interface, if restricted.
    pub host_ip: Option<String>,
    /// Host port.
    pub host_port: u16,
    /// Container port.
    pub container_port: u16,
    /// `tcp` or `udp`.
    pub protocol: String,
}

impl PortMapping {
    /// Map `host_port` to `container_port` over TCP on all interfaces.
    #[must_use]
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            host_ip: None,
            host_port,
            container_port,
            protocol: "tcp".into(),
        }
    }

    /// Parse a runtime CLI style publication string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` if the string is malformed.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || AppError::InvalidRequest(format!("invalid port mapping '{raw}'"));

        let (ports, protocol) = match raw.split_once('/') {
            Some((ports, proto)) if proto == "tcp" || proto == "udp" => (ports, proto),
            Some(_) => return Err(invalid()),
            None => (raw, "tcp"),
        };

        let parts: Vec<&str> = ports.split(':').collect();
        let (host_ip, host, container) = match parts.as_slice() {
            [host, container] => (None, *host, *container),
            [ip, host, container] if !ip.is_empty() => (Some((*ip).to_owned()), *host, *container),
            _ => return Err(invalid()),
        };

        let host_port = host.parse::<u16>().map_err(|_| invalid())?;
        let container_port = container.parse::<u16>().map_err(|_| invalid())?;
        if host_port == 0 || container_port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            host_ip,
            host_port,
            container_port,
            protocol: protocol.to_owned(),
        })
    }
}

impl Display for PortMapping {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(ref ip) = self.host_ip {
            write!(f, "{ip}:")?;
        }
        write!(f, "{}:{}", self.host_port, self.container_port)?;
        if self.protocol != "tcp" {
            write!(f, "/{}", self.protocol)?;
        }
        Ok(())
    }
}

/// Everything needed to create and start a checkpoint/restore-capable container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Published ports, the daemon control mapping included.
    pub ports: Vec<PortMapping>,
    /// Capabilities to add.
    pub capabilities: Vec<String>,
    /// Security option relaxations.
    pub security_opts: Vec<String>,
    /// Mounts, the controller directory bind mount included.
    pub mounts: Vec<MountSpec>,
    /// `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    /// Command run as the container entrypoint argument.
    pub command: Vec<String>,
    /// Host directory shared with the daemon.
    pub controller_dir: PathBuf,
}

/// Operations the lifecycle controller needs from a container runtime.
///
/// Every operation addresses the container by name or runtime identifier.
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a detached container with an init process.
    ///
    /// Returns the runtime-assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` if the runtime refuses the container.
    fn run(&self, spec: &RunSpec) -> RuntimeFuture<'_, String>;

    /// Start an existing, stopped container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` on failure.
    fn start(&self, container: &str) -> RuntimeFuture<'_, ()>;

    /// Stop a running container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` on failure.
    fn stop(&self, container: &str) -> RuntimeFuture<'_, ()>;

    /// Remove a container.
    ///
    /// Returns `false` when the container did not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` on any other failure.
    fn remove(&self, container: &str) -> RuntimeFuture<'_, bool>;

    /// Raw inspection document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown containers and
    /// `AppError::Runtime` on other failures.
    fn inspect(&self, container: &str) -> RuntimeFuture<'_, serde_json::Value>;

    /// Coarse lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown containers and
    /// `AppError::Runtime` on other failures.
    fn state(&self, container: &str) -> RuntimeFuture<'_, ContainerState>;

    /// All containers, running or not.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` on failure.
    fn list(&self) -> RuntimeFuture<'_, Vec<ContainerSummary>>;
}

/// Build the runtime adapter selected by configuration.
///
/// # Errors
///
/// Returns `AppError::Config` if the adapter cannot be constructed.
pub fn build_runtime(config: &RuntimeConfig) -> Result<Arc<dyn ContainerRuntime>> {
    match config.kind {
        RuntimeKind::Cli => Ok(Arc::new(cli::DockerCli::new(
            config.binary.clone(),
            config.command_timeout(),
        ))),
        RuntimeKind::Engine => Ok(Arc::new(engine::EngineApi::new(
            &config.engine_url,
            config.command_timeout(),
        )?)),
    }
}
