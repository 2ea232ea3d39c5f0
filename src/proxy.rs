//! Forwards run and checkpoint commands to a service's in-container daemon.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONNECTION, CONTENT_TYPE};
use reqwest::Client;
use tracing::{info, info_span, warn, Instrument};

use crate::models::request::CheckpointRequest;
use crate::models::service::ServiceStatus;
use crate::registry::ServiceRegistry;
use crate::{AppError, Result};

/// Command understood by the in-container daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonOperation {
    /// Launch or restore the workload.
    Run,
    /// Checkpoint the workload.
    Checkpoint,
}

impl DaemonOperation {
    /// Daemon endpoint path for this operation.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Run => "/run",
            Self::Checkpoint => "/checkpoint",
        }
    }
}

impl Display for DaemonOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run => f.write_str("run"),
            Self::Checkpoint => f.write_str("checkpoint"),
        }
    }
}

/// HTTP forwarder for daemon commands.
#[derive(Debug, Clone)]
pub struct CommandProxy {
    registry: Arc<ServiceRegistry>,
    client: Client,
    daemon_host: String,
}

impl CommandProxy {
    /// Build a proxy whose daemon calls time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(registry: Arc<ServiceRegistry>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("cannot build daemon client: {err}")))?;
        Ok(Self {
            registry,
            client,
            daemon_host: "127.0.0.1".into(),
        })
    }

    /// Forward `body` to the daemon of service `name` and return its reply.
    ///
    /// On success the service status is set from the operation: `run`
    /// yields `Running`; `checkpoint` yields `Running` when the request asked
    /// to leave the workload running and `Checkpointed` otherwise. Failures
    /// leave the status untouched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `name` is not subscribed (the daemon
    /// is not contacted), `AppError::DaemonUnreachable` on transport failure
    /// and `AppError::DaemonRejected` carrying the daemon's status and body
    /// when it answers non-2xx.
    pub async fn dispatch(
        &self,
        operation: DaemonOperation,
        name: &str,
        body: Vec<u8>,
    ) -> Result<String> {
        let span = info_span!("dispatch", %operation, name);
        async {
            let service = self.registry.get(name).await.map_err(|_| {
                AppError::NotFound(format!("service '{name}' is not subscribed"))
            })?;

            let next_status = match operation {
                DaemonOperation::Run => ServiceStatus::Running,
                DaemonOperation::Checkpoint if CheckpointRequest::leave_running_from(&body) => {
                    ServiceStatus::Running
                }
                DaemonOperation::Checkpoint => ServiceStatus::Checkpointed,
            };

            let url = format!(
                "http://{}:{}{}",
                self.daemon_host,
                service.control_port,
                operation.path()
            );
            info!(%url, "forwarding command to daemon");

            let response = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .header(CONNECTION, "close")
                .body(body)
                .send()
                .await
                .map_err(|err| AppError::DaemonUnreachable(format!("{url}: {err}")))?;

            let status = response.status();
            let reply = response
                .text()
                .await
                .map_err(|err| AppError::DaemonUnreachable(format!("{url}: {err}")))?;
            if !status.is_success() {
                warn!(status = status.as_u16(), "daemon rejected command");
                return Err(AppError::DaemonRejected {
                    status: status.as_u16(),
                    body: reply,
                });
            }

            self.registry.update_status(name, next_status).await?;
            Ok(reply)
        }
        .instrument(span)
        .await
    }
}
