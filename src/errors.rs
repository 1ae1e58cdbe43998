//! Error types shared across the inspector.

use std::fmt::{Display, Formatter};

/// Shared result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure modes of the inspector.
///
/// Transport failures (spawn, write, handshake) live here and end the
/// session. Protocol-level outcomes such as an `error` response or a timed
/// out call are ordinary data, see [`crate::rpc::orchestrator::CallOutcome`].
#[derive(Debug)]
pub enum AppError {
    /// Settings or server-registry parsing and validation failure.
    Config(String),
    /// The server executable could not be located.
    CommandNotFound(String),
    /// Any other failure while spawning the server process.
    Spawn(String),
    /// The server's stdin is closed or broken.
    Write(String),
    /// The `initialize` exchange did not succeed.
    Handshake(String),
    /// A call completed without a usable result.
    Rpc(String),
    /// No server matched the requested selection.
    NotFound(String),
    /// File-system or stream I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::CommandNotFound(msg) => write!(f, "command not found: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Write(msg) => write!(f, "write: {msg}"),
            Self::Handshake(msg) => write!(f, "handshake: {msg}"),
            Self::Rpc(msg) => write!(f, "rpc: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Whether this error is a failure to locate the server executable.
    ///
    /// Only this class of spawn failure may trigger the single-server
    /// fallback command.
    #[must_use]
    pub fn is_command_not_found(&self) -> bool {
        matches!(self, Self::CommandNotFound(_))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid settings: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("invalid json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
