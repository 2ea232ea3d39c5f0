//! Out-of-band status channel between the agent and the in-container daemon.
//!
//! The daemon reports its fine-grained state by writing a single ASCII
//! byte into a FIFO inside the shared service directory:
//! `'0'` standby, `'1'` running, `'2'` checkpointed.
//!
//! The FIFO is opened non-blocking and the read is bounded by a timeout,
//! so an absent or stalled daemon never blocks a status query.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::models::service::ServiceStatus;
use crate::{AppError, Result};

/// Time-bounded reader for per-service status FIFOs.
#[derive(Debug, Clone, Copy)]
pub struct StatusChannel {
    timeout: Duration,
}

impl StatusChannel {
    /// Create a reader that waits at most `timeout` for the status byte.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Read the daemon's status and map it to a [`ServiceStatus`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::StatusChannel` if the FIFO cannot be opened, no
    /// byte arrives in time, or the byte is outside the protocol.
    pub async fn read_status(&self, pipe: &Path) -> Result<ServiceStatus> {
        let byte = self.read_byte(pipe).await?;
        ServiceStatus::from_channel_byte(byte).ok_or_else(|| {
            AppError::StatusChannel(format!(
                "unexpected status byte {byte:#04x} from {}",
                pipe.display()
            ))
        })
    }

    /// Read exactly one byte from the FIFO at `pipe`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StatusChannel` on open failure, read failure or timeout.
    #[cfg(unix)]
    pub async fn read_byte(&self, pipe: &Path) -> Result<u8> {
        use tokio::io::AsyncReadExt;
        use tokio::net::unix::pipe::OpenOptions;

        let mut options = OpenOptions::new();
        // Opened read-write: with no daemon attached the read times out
        // instead of returning EOF.
        #[cfg(target_os = "linux")]
        options.read_write(true);

        let mut receiver = options.open_receiver(pipe).map_err(|err| {
            AppError::StatusChannel(format!("cannot open {}: {err}", pipe.display()))
        })?;

        match tokio::time::timeout(self.timeout, receiver.read_u8()).await {
            Ok(Ok(byte)) => {
                debug!(pipe = %pipe.display(), byte, "status byte read");
                Ok(byte)
            }
            Ok(Err(err)) => Err(AppError::StatusChannel(format!(
                "cannot read {}: {err}",
                pipe.display()
            ))),
            Err(_) => Err(AppError::StatusChannel(format!(
                "no status byte on {} within {}ms",
                pipe.display(),
                self.timeout.as_millis()
            ))),
        }
    }

    /// Read exactly one byte from the FIFO at `pipe`.
    ///
    /// # Errors
    ///
    /// Always returns `AppError::StatusChannel`: FIFOs need a unix host.
    #[cfg(not(unix))]
    pub async fn read_byte(&self, pipe: &Path) -> Result<u8> {
        Err(AppError::StatusChannel(format!(
            "status channel {} requires a unix host",
            pipe.display()
        )))
    }
}
