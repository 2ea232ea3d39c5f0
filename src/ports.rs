//! Control port allocation.
//!
//! Candidates are probed by binding a listener and dropping it again. The
//! probe alone cannot stop another caller from picking the same port before
//! the container runtime binds it, so every returned port is also recorded
//! in a reserved set under the same lock as the probe. Reservations are
//! dropped only when the owning service leaves the registry.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::{AppError, Result};

/// Lock-protected allocator handing out host ports for daemon control APIs.
#[derive(Debug)]
pub struct PortAllocator {
    scan_limit: u16,
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    /// Create an allocator probing at most `scan_limit` candidates per call.
    #[must_use]
    pub fn new(scan_limit: u16) -> Self {
        Self {
            scan_limit,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Find and reserve the first bindable port above `min_exclusive`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PortExhausted` if no candidate within the scan
    /// range is both unreserved and bindable.
    pub fn allocate(&self, min_exclusive: u16) -> Result<u16> {
        let first = u32::from(min_exclusive) + 1;
        let last = (u32::from(min_exclusive) + u32::from(self.scan_limit)).min(u32::from(u16::MAX));

        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        for candidate in first..=last {
            let Ok(port) = u16::try_from(candidate) else {
                break;
            };
            if reserved.contains(&port) {
                continue;
            }
            if is_bindable(port) {
                reserved.insert(port);
                debug!(port, "control port reserved");
                return Ok(port);
            }
        }

        Err(AppError::PortExhausted(format!(
            "no free port in {first}..={last}"
        )))
    }

    /// Mark a port as owned without probing it.
    ///
    /// Used for services whose container already holds the port. Returns
    /// `false` if the port was already reserved.
    pub fn reserve(&self, port: u16) -> bool {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(port)
    }

    /// Return a port to the pool.
    pub fn release(&self, port: u16) {
        let removed = self
            .reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&port);
        if removed {
            debug!(port, "control port released");
        }
    }

    /// Snapshot of the reserved ports, sorted.
    #[must_use]
    pub fn reserved(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        ports.sort_unstable();
        ports
    }
}

/// Probe a port on all interfaces, the way the runtime publishes it.
fn is_bindable(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).is_ok()
}
