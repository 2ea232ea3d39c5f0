//! Periodic liveness report to the cluster manager.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Body of one heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heartbeat<'a> {
    /// Identifier of this worker.
    pub worker_id: &'a str,
}

/// Send a single heartbeat.
///
/// # Errors
///
/// Returns `AppError::Io` if the manager cannot be reached or answers non-2xx.
pub async fn send_heartbeat(client: &Client, url: &str, worker_id: &str) -> Result<()> {
    let response = client
        .post(url)
        .json(&Heartbeat { worker_id })
        .send()
        .await
        .map_err(|err| AppError::Io(format!("heartbeat to {url} failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Io(format!(
            "heartbeat to {url} answered {status}"
        )));
    }
    debug!(url, "heartbeat acknowledged");
    Ok(())
}

/// Spawn the heartbeat loop.
///
/// The first heartbeat goes out immediately, then one per `interval`.
/// Failures are logged and never stop the loop; cancelling `cancel` does.
#[must_use]
pub fn spawn_heartbeat_task(
    client: Client,
    url: String,
    worker_id: String,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(%url, worker_id, "heartbeat task started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("heartbeat task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = send_heartbeat(&client, &url, &worker_id).await {
                        warn!(%err, "heartbeat failed");
                    }
                }
            }
        }
    })
}

/// HTTP client for heartbeats with a per-request `timeout`.
///
/// # Errors
///
/// Returns `AppError::Config` if the client cannot be built.
pub fn heartbeat_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| AppError::Config(format!("cannot build heartbeat client: {err}")))
}
