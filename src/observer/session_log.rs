//! JSONL session log.
//!
//! One file per inspector run, `session-YYYYMMDD-HHMMSS.jsonl`, with one
//! JSON object per observer event. The log is write-only; nothing in the
//! inspector reads it back.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::{Observer, OutcomeReport, StreamKind};
use crate::rpc::message::{Inbound, Message, RequestId};
use crate::{AppError, Result};

/// Classification of a log entry.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    /// Message written to the server.
    Outgoing,
    /// Raw stdout line.
    Stdout,
    /// Raw stderr line.
    Stderr,
    /// Reply-stream message that was not a response.
    Unhandled,
    /// Over-long line cut at the limit.
    Truncated,
    /// Deadline extension.
    Extension,
    /// Terminal outcome of a call.
    Outcome,
}

/// A single log record.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
    /// Server the session talks to.
    pub server: String,
    /// Event classification.
    pub kind: LogEventKind,
    /// Raw line for stream events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// Structured payload for message, extension and outcome events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Observer appending [`LogEntry`] records to a JSONL file.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    server: Mutex<String>,
    writer: Mutex<BufWriter<File>>,
}

impl SessionLog {
    /// Create `session-<stamp>.jsonl` in `log_dir`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the directory or file cannot be
    /// created.
    pub fn create(log_dir: &Path, server: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(log_dir).map_err(|e| {
            AppError::Config(format!(
                "failed to create log directory {}: {e}",
                log_dir.display()
            ))
        })?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let path = log_dir.join(format!("session-{stamp}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                AppError::Config(format!("failed to open session log {}: {e}", path.display()))
            })?;
        Ok(Self {
            path,
            server: Mutex::new(server.into()),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tag subsequent entries with a different server name.
    pub fn set_server(&self, server: impl Into<String>) {
        if let Ok(mut guard) = self.server.lock() {
            *guard = server.into();
        }
    }

    fn append(&self, kind: LogEventKind, line: Option<&str>, payload: Option<Value>) {
        let server = self
            .server
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let entry = LogEntry {
            timestamp: Utc::now(),
            server,
            kind,
            line: line.map(str::to_owned),
            payload,
        };

        let Ok(mut writer) = self.writer.lock() else {
            warn!("session log mutex poisoned, entry dropped");
            return;
        };
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize session log entry: {e}");
                return;
            }
        };
        if let Err(e) = writeln!(writer, "{line}") {
            warn!(path = %self.path.display(), "failed to write session log entry: {e}");
            return;
        }
        if let Err(e) = writer.flush() {
            warn!(path = %self.path.display(), "failed to flush session log: {e}");
        }
    }
}

impl Observer for SessionLog {
    fn outgoing(&self, message: &Message) {
        self.append(LogEventKind::Outgoing, None, Some(message.to_value()));
    }

    fn reply_line(&self, line: &str) {
        self.append(LogEventKind::Stdout, Some(line), None);
    }

    fn diagnostic_line(&self, line: &str) {
        self.append(LogEventKind::Stderr, Some(line), None);
    }

    fn unhandled(&self, inbound: &Inbound) {
        let payload = serde_json::json!({ "kind": inbound.kind() });
        self.append(LogEventKind::Unhandled, None, Some(payload));
    }

    fn line_truncated(&self, stream: StreamKind, limit: usize) {
        let payload = serde_json::json!({ "stream": stream, "limit": limit });
        self.append(LogEventKind::Truncated, None, Some(payload));
    }

    fn extension(&self, id: RequestId, method: &str, window: Duration) {
        let payload = serde_json::json!({
            "id": id,
            "method": method,
            "window_ms": u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        });
        self.append(LogEventKind::Extension, None, Some(payload));
    }

    fn outcome(&self, report: &OutcomeReport) {
        self.append(LogEventKind::Outcome, None, serde_json::to_value(report).ok());
    }

    fn server_changed(&self, server: &str) {
        self.set_server(server);
    }
}
