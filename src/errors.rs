//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Caller supplied a malformed request.
    InvalidRequest(String),
    /// A service with the same name is already registered.
    DuplicateService(String),
    /// Requested service or container does not exist.
    NotFound(String),
    /// Per-service or root directory could not be created or removed.
    Directory(String),
    /// No bindable control port was found within the scan range.
    PortExhausted(String),
    /// Container runtime create/start/stop/remove/inspect failure.
    Runtime(String),
    /// Container is not in a state that allows the requested start.
    AlreadyRunning(String),
    /// The in-container daemon could not be reached.
    DaemonUnreachable(String),
    /// The in-container daemon answered with a non-2xx status.
    DaemonRejected {
        /// HTTP status code returned by the daemon.
        status: u16,
        /// Response body, passed through verbatim.
        body: String,
    },
    /// The status channel could not be opened or read.
    StatusChannel(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::DuplicateService(msg) => write!(f, "duplicate service: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Directory(msg) => write!(f, "directory: {msg}"),
            Self::PortExhausted(msg) => write!(f, "port exhausted: {msg}"),
            Self::Runtime(msg) => write!(f, "runtime: {msg}"),
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::DaemonUnreachable(msg) => write!(f, "daemon unreachable: {msg}"),
            Self::DaemonRejected { status, body } => {
                write!(f, "daemon rejected ({status}): {body}")
            }
            Self::StatusChannel(msg) => write!(f, "status channel: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
