//! Service record and lifecycle status.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::runtime::ContainerState;

/// Lifecycle status of a managed service.
///
/// `Standby`, `Running` and `Checkpointed` come from the in-container
/// daemon; the remaining values mirror the runtime's coarse state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Registered but not yet resolved.
    New,
    /// Application process is running inside the container.
    Running,
    /// Container is up, daemon is waiting for a restore.
    Standby,
    /// Application has been checkpointed.
    Checkpointed,
    /// Container has exited.
    Exited,
    /// Runtime reported a state the agent cannot interpret.
    Error,
    /// Container created but never started.
    Created,
    /// Container processes are frozen by the runtime.
    Paused,
    /// Runtime is restarting the container.
    Restarting,
    /// Runtime is removing the container.
    Removing,
    /// Container is dead and must be removed.
    Dead,
}

impl ServiceStatus {
    /// Map a byte read from the status channel to a fine-grained status.
    ///
    /// Returns `None` for bytes outside the daemon protocol.
    #[must_use]
    pub fn from_channel_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Standby),
            b'1' => Some(Self::Running),
            b'2' => Some(Self::Checkpointed),
            _ => None,
        }
    }

    /// Lowercase wire name, identical to the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::Standby => "standby",
            Self::Checkpointed => "checkpointed",
            Self::Exited => "exited",
            Self::Error => "error",
            Self::Created => "created",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Dead => "dead",
        }
    }
}

impl Display for ServiceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ContainerState> for ServiceStatus {
    fn from(state: &ContainerState) -> Self {
        match state {
            ContainerState::Created => Self::Created,
            ContainerState::Running => Self::Running,
            ContainerState::Paused => Self::Paused,
            ContainerState::Restarting => Self::Restarting,
            ContainerState::Removing => Self::Removing,
            ContainerState::Exited => Self::Exited,
            ContainerState::Dead => Self::Dead,
            ContainerState::Unknown(_) => Self::Error,
        }
    }
}

/// The agent's record of one managed container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Service {
    /// Unique key; doubles as the container name.
    pub name: String,
    /// Identifier assigned by the container runtime; empty until created.
    pub runtime_id: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Host port mapped to the daemon's internal control port.
    pub control_port: u16,
    /// Last resolved lifecycle status.
    pub status: ServiceStatus,
}

impl Service {
    /// Construct a freshly subscribed service in the `New` state.
    #[must_use]
    pub fn new(name: String, runtime_id: String, image: String, control_port: u16) -> Self {
        Self {
            name,
            runtime_id,
            image,
            control_port,
            status: ServiceStatus::New,
        }
    }

    /// Reference used when addressing the container at the runtime.
    ///
    /// Prefers the runtime identifier and falls back to the name before
    /// the container has been created.
    #[must_use]
    pub fn container_ref(&self) -> &str {
        if self.runtime_id.is_empty() {
            &self.name
        } else {
            &self.runtime_id
        }
    }
}
