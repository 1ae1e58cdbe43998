//! Inspector settings parsing and validation.
//!
//! Settings are optional: every field has a default, so a missing settings
//! file behaves exactly like an empty one.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::rpc::codec::MAX_LINE_BYTES;
use crate::rpc::history::DEFAULT_HISTORY_CAPACITY;
use crate::rpc::orchestrator::StreamLimits;
use crate::{AppError, Result};

/// Deadlines (seconds) for the calls the inspector makes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Listing calls (`tools/list`, `resources/list`, `prompts/list`).
    #[serde(default = "default_request_seconds")]
    pub request_seconds: u64,
    /// The `initialize` handshake.
    #[serde(default = "default_initialize_seconds")]
    pub initialize_seconds: u64,
    /// `tools/call`, `resources/read` and `prompts/get`.
    #[serde(default = "default_call_seconds")]
    pub call_seconds: u64,
    /// Length of one deadline extension.
    #[serde(default = "default_extension_seconds")]
    pub extension_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: default_request_seconds(),
            initialize_seconds: default_initialize_seconds(),
            call_seconds: default_call_seconds(),
            extension_seconds: default_extension_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Deadline for listing calls.
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_seconds)
    }

    /// Deadline for the handshake.
    #[must_use]
    pub fn initialize(&self) -> Duration {
        Duration::from_secs(self.initialize_seconds)
    }

    /// Deadline for tool calls, reads and prompt gets.
    #[must_use]
    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_seconds)
    }

    /// Extension window.
    #[must_use]
    pub fn extension(&self) -> Duration {
        Duration::from_secs(self.extension_seconds)
    }
}

fn default_request_seconds() -> u64 {
    10
}

fn default_initialize_seconds() -> u64 {
    15
}

fn default_call_seconds() -> u64 {
    60
}

fn default_extension_seconds() -> u64 {
    30
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_max_line_bytes() -> usize {
    MAX_LINE_BYTES
}

fn default_stop_grace_seconds() -> u64 {
    2
}

fn default_fallback_command() -> Vec<String> {
    vec!["python".into(), "main.py".into()]
}

fn default_protocol_version() -> String {
    "2024-11-05".into()
}

fn default_client_name() -> String {
    "mcp-inspector".into()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

/// Settings parsed from the optional `inspector.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct InspectorSettings {
    /// Lines retained per history buffer.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Longest stdout or stderr line kept whole; longer lines are truncated.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Time a stopping server gets before it is killed.
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
    /// Command tried when the only configured server cannot be found.
    #[serde(default = "default_fallback_command")]
    pub fallback_command: Vec<String>,
    /// `protocolVersion` sent in `initialize`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// `clientInfo.name` sent in `initialize`.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// `clientInfo.version` sent in `initialize`.
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// Directory for JSONL session logs; no log is written when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Call deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for InspectorSettings {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            max_line_bytes: default_max_line_bytes(),
            stop_grace_seconds: default_stop_grace_seconds(),
            fallback_command: default_fallback_command(),
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            log_dir: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl InspectorSettings {
    /// Load and validate settings from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read settings {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: Self = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Grace period for [`ServerProcess::stop`](crate::rpc::process::ServerProcess::stop).
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }

    /// History and line limits for a session's streams.
    #[must_use]
    pub fn stream_limits(&self) -> StreamLimits {
        StreamLimits {
            history_capacity: self.history_capacity,
            max_line_bytes: self.max_line_bytes,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(AppError::Config(
                "history_capacity must be greater than zero".into(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(AppError::Config(
                "max_line_bytes must be greater than zero".into(),
            ));
        }

        let timeouts = [
            ("request_seconds", self.timeouts.request_seconds),
            ("initialize_seconds", self.timeouts.initialize_seconds),
            ("call_seconds", self.timeouts.call_seconds),
            ("extension_seconds", self.timeouts.extension_seconds),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(AppError::Config(format!(
                "timeouts.{name} must be greater than zero"
            )));
        }

        let names_program = self
            .fallback_command
            .first()
            .is_some_and(|program| !program.is_empty());
        if !names_program {
            return Err(AppError::Config(
                "fallback_command must name a program".into(),
            ));
        }

        Ok(())
    }
}
