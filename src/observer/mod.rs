//! Presentation and audit hooks for protocol traffic.
//!
//! The transport never prints anything itself. Every event a human might
//! want to see is handed to an [`Observer`]:
//!
//! | Hook                   | Fired by                              |
//! |------------------------|---------------------------------------|
//! | [`Observer::outgoing`] | orchestrator, before the line is sent |
//! | [`Observer::reply_line`] | reply reader, per stdout line       |
//! | [`Observer::diagnostic_line`] | diagnostic reader, per stderr line |
//! | [`Observer::unhandled`] | reply reader, non-response shapes    |
//! | [`Observer::line_truncated`] | either reader, over-long line   |
//! | [`Observer::extension`] | orchestrator, when a wait is extended |
//! | [`Observer::outcome`]  | orchestrator, before returning a call |
//! | [`Observer::server_changed`] | client, before switching servers |
//!
//! Hooks run on the reader tasks and the caller's task, so implementations
//! must be cheap and must not block for long.

pub mod session_log;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::rpc::message::{Inbound, Message, RequestId};

/// Classification of a finished call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A `result` arrived.
    Resolved,
    /// An `error` object arrived.
    ProtocolError,
    /// The deadline passed and no extension was granted.
    TimedOut,
    /// The caller declined to keep waiting.
    Abandoned,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Resolved => "resolved",
            Self::ProtocolError => "protocol_error",
            Self::TimedOut => "timed_out",
            Self::Abandoned => "abandoned",
        };
        f.write_str(label)
    }
}

/// Which server stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// The reply stream.
    Stdout,
    /// The diagnostic stream.
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Terminal report for one correlated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// Request id.
    pub id: RequestId,
    /// Request method.
    pub method: String,
    /// Final classification.
    pub kind: OutcomeKind,
    /// Number of granted deadline extensions.
    pub extensions: u32,
    /// Time from send to outcome.
    pub elapsed: Duration,
    /// When the outcome was reached.
    pub at: DateTime<Utc>,
    /// Error text for protocol errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Receiver of protocol traffic events. Every hook defaults to a no-op.
pub trait Observer: Send + Sync {
    /// A message is about to be written to the server.
    fn outgoing(&self, _message: &Message) {}

    /// A non-empty line arrived on the reply stream.
    fn reply_line(&self, _line: &str) {}

    /// A non-empty line arrived on the diagnostic stream.
    fn diagnostic_line(&self, _line: &str) {}

    /// A reply-stream message that is not a response to us.
    fn unhandled(&self, _inbound: &Inbound) {}

    /// A line on `stream` exceeded `limit` bytes and was cut; only its
    /// head reached the history.
    fn line_truncated(&self, _stream: StreamKind, _limit: usize) {}

    /// A wait was extended by `window` after a timeout.
    fn extension(&self, _id: RequestId, _method: &str, _window: Duration) {}

    /// A correlated call reached its terminal state.
    fn outcome(&self, _report: &OutcomeReport) {}

    /// Later events belong to `server`.
    fn server_changed(&self, _server: &str) {}
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {}

/// Observer that turns events into `tracing` records.
#[derive(Debug)]
pub struct TracingObserver {
    server: RwLock<String>,
}

impl TracingObserver {
    /// Tag every record with `server`.
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: RwLock::new(server.into()),
        }
    }

    /// Server name records are currently tagged with.
    #[must_use]
    pub fn server(&self) -> String {
        self.server
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Observer for TracingObserver {
    fn outgoing(&self, message: &Message) {
        info!(
            server = %self.server(),
            id = message.id(),
            method = message.method(),
            payload = %message.to_value(),
            "-> outgoing"
        );
    }

    fn reply_line(&self, line: &str) {
        debug!(server = %self.server(), line, "<- stdout");
    }

    fn diagnostic_line(&self, line: &str) {
        info!(server = %self.server(), line, "<- stderr");
    }

    fn unhandled(&self, inbound: &Inbound) {
        debug!(server = %self.server(), kind = inbound.kind(), "unhandled inbound message");
    }

    fn line_truncated(&self, stream: StreamKind, limit: usize) {
        warn!(server = %self.server(), %stream, limit, "line exceeds limit, truncated");
    }

    fn extension(&self, id: RequestId, method: &str, window: Duration) {
        info!(server = %self.server(), id, method, ?window, "extending wait");
    }

    fn outcome(&self, report: &OutcomeReport) {
        match report.kind {
            OutcomeKind::Resolved => info!(
                server = %self.server(),
                id = report.id,
                method = %report.method,
                elapsed = ?report.elapsed,
                "call resolved"
            ),
            kind => warn!(
                server = %self.server(),
                id = report.id,
                method = %report.method,
                %kind,
                extensions = report.extensions,
                detail = report.detail.as_deref(),
                "call did not resolve"
            ),
        }
    }

    fn server_changed(&self, server: &str) {
        let mut guard = self.server.write().unwrap_or_else(PoisonError::into_inner);
        info!(from = %guard, to = server, "observer retagged");
        *guard = server.to_owned();
    }
}

/// Forwards every event to each inner observer in order.
#[derive(Default, Clone)]
pub struct Fanout {
    observers: Vec<Arc<dyn Observer>>,
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Fanout {
    /// Empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl Observer for Fanout {
    fn outgoing(&self, message: &Message) {
        self.observers.iter().for_each(|o| o.outgoing(message));
    }

    fn reply_line(&self, line: &str) {
        self.observers.iter().for_each(|o| o.reply_line(line));
    }

    fn diagnostic_line(&self, line: &str) {
        self.observers.iter().for_each(|o| o.diagnostic_line(line));
    }

    fn unhandled(&self, inbound: &Inbound) {
        self.observers.iter().for_each(|o| o.unhandled(inbound));
    }

    fn line_truncated(&self, stream: StreamKind, limit: usize) {
        self.observers
            .iter()
            .for_each(|o| o.line_truncated(stream, limit));
    }

    fn extension(&self, id: RequestId, method: &str, window: Duration) {
        self.observers
            .iter()
            .for_each(|o| o.extension(id, method, window));
    }

    fn outcome(&self, report: &OutcomeReport) {
        self.observers.iter().for_each(|o| o.outcome(report));
    }

    fn server_changed(&self, server: &str) {
        self.observers.iter().for_each(|o| o.server_changed(server));
    }
}
