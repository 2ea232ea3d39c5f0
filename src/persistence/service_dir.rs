//! Per-service directory tree on the host.
//!
//! Layout under the root services directory:
//!
//! ```text
//! <root>/<name>/status_pipe   FIFO the daemon writes its status byte into
//! <root>/<name>/daemon_port   control port, plain text
//! ```
//!
//! The service directory is bind-mounted into the container so the
//! daemon sees the FIFO at a fixed in-container path.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{AppError, Result};

/// File name of the status channel FIFO inside a service directory.
pub const STATUS_PIPE: &str = "status_pipe";

/// File name of the recorded control port inside a service directory.
pub const PORT_FILE: &str = "daemon_port";

/// Handle on the root services directory.
#[derive(Debug, Clone)]
pub struct ServiceDirs {
    root: PathBuf,
}

impl ServiceDirs {
    /// Create a handle; nothing is touched on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root services directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root services directory if missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Directory` if the directory cannot be created.
    pub async fn create_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|err| {
            AppError::Directory(format!(
                "cannot create services root {}: {err}",
                self.root.display()
            ))
        })?;
        info!(root = %self.root.display(), "services root ready");
        Ok(())
    }

    /// Path of the service's directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` if `name` is not a valid service name.
    pub fn service_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Path of the service's status channel FIFO.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` if `name` is not a valid service name.
    pub fn status_pipe(&self, name: &str) -> Result<PathBuf> {
        Ok(self.service_path(name)?.join(STATUS_PIPE))
    }

    /// Idempotently create the service directory and its status channel.
    ///
    /// Returns the absolute service directory path, suitable for a bind mount.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Directory` if the directory or FIFO cannot be created.
    pub async fn ensure(&self, name: &str) -> Result<PathBuf> {
        let dir = self.service_path(name)?;
        tokio::fs::create_dir_all(&dir).await.map_err(|err| {
            AppError::Directory(format!("cannot create {}: {err}", dir.display()))
        })?;

        let pipe = dir.join(STATUS_PIPE);
        if tokio::fs::symlink_metadata(&pipe).await.is_err() {
            create_fifo(&pipe)?;
            debug!(pipe = %pipe.display(), "status channel created");
        }

        tokio::fs::canonicalize(&dir).await.map_err(|err| {
            AppError::Directory(format!("cannot resolve {}: {err}", dir.display()))
        })
    }

    /// Record the control port of a service.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Directory` if the port file cannot be written.
    pub async fn write_port(&self, name: &str, port: u16) -> Result<()> {
        let path = self.service_path(name)?.join(PORT_FILE);
        tokio::fs::write(&path, port.to_string())
            .await
            .map_err(|err| AppError::Directory(format!("cannot write {}: {err}", path.display())))
    }

    /// Read the recorded control port of a service, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Directory` if the file exists but is unreadable or
    /// does not hold a port number.
    pub async fn read_port(&self, name: &str) -> Result<Option<u16>> {
        let path = self.service_path(name)?.join(PORT_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw.trim().parse::<u16>().map(Some).map_err(|err| {
                AppError::Directory(format!("invalid port in {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Directory(format!(
                "cannot read {}: {err}",
                path.display()
            ))),
        }
    }

    /// Delete a service directory. Missing directories are not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Directory` if the directory exists but cannot be removed.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let dir = self.service_path(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Directory(format!(
                "cannot remove {}: {err}",
                dir.display()
            ))),
        }
    }

    /// Names of all per-service subdirectories, sorted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Directory` if the root cannot be listed.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|err| {
            AppError::Directory(format!("cannot list {}: {err}", self.root.display()))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_name(name).is_ok() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Check that a service name is safe to use as a path component and as a
/// container name.
///
/// # Errors
///
/// Returns `AppError::InvalidRequest` describing the violation.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::InvalidRequest("service name must not be empty".into()));
    }
    if name == "." || name == ".." {
        return Err(AppError::InvalidRequest(format!(
            "service name '{name}' is reserved"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AppError::InvalidRequest(format!(
            "service name '{name}' may only contain [A-Za-z0-9_.-]"
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn create_fifo(path: &Path) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::stat::Mode;

    match nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) | Err(Errno::EEXIST) => Ok(()),
        Err(err) => Err(AppError::Directory(format!(
            "cannot create status channel {}: {err}",
            path.display()
        ))),
    }
}

#[cfg(not(unix))]
fn create_fifo(path: &Path) -> Result<()> {
    Err(AppError::Directory(format!(
        "status channel {} requires a unix host",
        path.display()
    )))
}
