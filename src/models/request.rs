//! Request and response payloads of the control API.

use serde::{Deserialize, Serialize};

/// A mount requested for the application container.
///
/// Accepts the runtime's own `PascalCase` keys as well as lowercase ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct MountSpec {
    /// Mount type: `bind`, `volume` or `tmpfs`.
    #[serde(alias = "type", default = "default_mount_type")]
    pub r#type: String,
    /// Host path or volume name.
    #[serde(alias = "source", default)]
    pub source: String,
    /// Path inside the container.
    #[serde(alias = "target")]
    pub target: String,
    /// Mount read-only.
    #[serde(alias = "read_only", alias = "readonly", default)]
    pub read_only: bool,
}

fn default_mount_type() -> String {
    "bind".into()
}

impl MountSpec {
    /// Build a read-write bind mount.
    #[must_use]
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            r#type: "bind".into(),
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Render the mount in the runtime CLI's `--mount` syntax.
    #[must_use]
    pub fn to_cli_arg(&self) -> String {
        let mut arg = format!("type={}", self.r#type);
        if !self.source.is_empty() {
            arg.push_str(",source=");
            arg.push_str(&self.source);
        }
        arg.push_str(",target=");
        arg.push_str(&self.target);
        if self.read_only {
            arg.push_str(",readonly");
        }
        arg
    }
}

/// Body of `POST /start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartRequest {
    /// Service and container name.
    pub container_name: String,
    /// Image to run.
    pub image: String,
    /// Application port mappings in `[ip:]host:container[/proto]` form.
    #[serde(default)]
    pub app_ports: Vec<String>,
    /// `KEY=VALUE` environment entries.
    #[serde(default)]
    pub envs: Vec<String>,
    /// Additional mounts.
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    /// Additional capabilities.
    #[serde(default)]
    pub caps: Vec<String>,
}

/// Body of `POST /checkpoint/{name}`.
///
/// Only `leave_running` is interpreted by the agent. Every other field
/// (`image_url`, `num_shards`, `cpu_budget`, ...) belongs to the daemon and
/// is forwarded in the raw body without being parsed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckpointRequest {
    /// Keep the application running after the checkpoint.
    pub leave_running: bool,
}

impl CheckpointRequest {
    /// Extract the `leave_running` flag from a raw body.
    ///
    /// A body that is not a JSON object, or whose `leave_running` is not a
    /// boolean, is treated as `leave_running = false`.
    #[must_use]
    pub fn leave_running_from(body: &[u8]) -> bool {
        serde_json::from_slice::<Self>(body).is_ok_and(|req| req.leave_running)
    }
}

/// Query string of `POST /subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeQuery {
    /// Service and container name.
    pub container_name: String,
    /// Runtime identifier of the existing container.
    #[serde(default)]
    pub container_id: String,
    /// Image reference.
    #[serde(default)]
    pub image: String,
    /// Host port already mapped to the daemon.
    pub daemon_port: u16,
}

/// Generic `{"message": ...}` reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    /// Human-readable message or verbatim daemon reply.
    pub message: String,
}

impl MessageResponse {
    /// Wrap any string-like value.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
