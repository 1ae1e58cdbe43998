//! Request orchestrator: the caller-facing half of the transport.
//!
//! A correlated call moves through
//!
//! ```text
//! SENT ──► WAITING ──► RESOLVED | TIMED_OUT | ABANDONED
//!             ▲   │
//!             └───┘ extension (no resend)
//! ```
//!
//! The orchestrator owns the writer, the correlator, both history buffers
//! and the two reader tasks. Readers are spawned on [`Orchestrator::attach`]
//! and run until end of stream or [`Orchestrator::shutdown`].
//!
//! Once the reply stream has ended, a call whose deadline passes times out
//! without consulting the [`DeadlinePolicy`]: no reply can arrive any more.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::observer::{Observer, OutcomeKind, OutcomeReport};
use crate::rpc::codec::MAX_LINE_BYTES;
use crate::rpc::correlator::Correlator;
use crate::rpc::history::{Histories, HistorySnapshot, DEFAULT_HISTORY_CAPACITY};
use crate::rpc::message::{Message, RequestId, RpcError};
use crate::rpc::policy::{DeadlinePolicy, ExtensionDecision, TimeoutContext};
use crate::rpc::reader::{run_diagnostic_reader, run_reply_reader, ReaderExit};
use crate::rpc::writer::LineWriter;
use crate::{AppError, Result};

/// Default deadline for a correlated call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default length of one deadline extension.
pub const DEFAULT_EXTENSION_WINDOW: Duration = Duration::from_secs(30);

/// Size limits applied to both server streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Lines kept per history buffer.
    pub history_capacity: usize,
    /// Longest line accepted before truncation.
    pub max_line_bytes: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_line_bytes: MAX_LINE_BYTES,
        }
    }
}

/// Per-call waiting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// Deadline measured from the write.
    pub timeout: Duration,
    /// Whether the deadline policy is consulted on timeout.
    pub extendable: bool,
    /// Length of each granted extension.
    pub extension_window: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::fixed(DEFAULT_TIMEOUT)
    }
}

impl CallOptions {
    /// A deadline that is never extended.
    #[must_use]
    pub fn fixed(timeout: Duration) -> Self {
        Self {
            timeout,
            extendable: false,
            extension_window: DEFAULT_EXTENSION_WINDOW,
        }
    }

    /// A deadline the policy may extend by `window` at a time.
    #[must_use]
    pub fn extendable(timeout: Duration, window: Duration) -> Self {
        Self {
            timeout,
            extendable: true,
            extension_window: window,
        }
    }
}

/// Terminal state of a correlated call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The server answered with a `result`.
    Resolved(Value),
    /// The server answered with an `error` object.
    ProtocolError(RpcError),
    /// The deadline passed without an extension.
    TimedOut,
    /// The policy declined to keep waiting.
    Abandoned,
}

impl CallOutcome {
    /// Classification used in reports.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Resolved(_) => OutcomeKind::Resolved,
            Self::ProtocolError(_) => OutcomeKind::ProtocolError,
            Self::TimedOut => OutcomeKind::TimedOut,
            Self::Abandoned => OutcomeKind::Abandoned,
        }
    }

    /// Collapse into the result value.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rpc`] for every outcome except
    /// [`CallOutcome::Resolved`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Resolved(value) => Ok(value),
            Self::ProtocolError(error) => Err(AppError::Rpc(error.to_string())),
            Self::TimedOut => Err(AppError::Rpc("timed out waiting for response".into())),
            Self::Abandoned => Err(AppError::Rpc("gave up waiting for response".into())),
        }
    }
}

/// Caller-facing transport over one server's standard streams.
pub struct Orchestrator {
    server: String,
    writer: LineWriter,
    correlator: Arc<Correlator>,
    histories: Histories,
    observer: Arc<dyn Observer>,
    policy: Arc<dyn DeadlinePolicy>,
    next_id: AtomicU64,
    cancel: CancellationToken,
    readers: Mutex<Vec<JoinHandle<ReaderExit>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("server", &self.server)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire up the streams and spawn both reader tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<W, R, E>(
        server: impl Into<String>,
        stdin: W,
        stdout: R,
        stderr: E,
        limits: StreamLimits,
        observer: Arc<dyn Observer>,
        policy: Arc<dyn DeadlinePolicy>,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        let server = server.into();
        let correlator = Arc::new(Correlator::new());
        let histories = Histories::new(limits.history_capacity);
        let cancel = CancellationToken::new();

        let reply = tokio::spawn(run_reply_reader(
            server.clone(),
            stdout,
            limits.max_line_bytes,
            Arc::clone(&histories.replies),
            Arc::clone(&correlator),
            Arc::clone(&observer),
            cancel.clone(),
        ));
        let diagnostic = tokio::spawn(run_diagnostic_reader(
            server.clone(),
            stderr,
            limits.max_line_bytes,
            Arc::clone(&histories.diagnostics),
            Arc::clone(&observer),
            cancel.clone(),
        ));

        debug!(
            server = %server,
            history_capacity = limits.history_capacity,
            max_line_bytes = limits.max_line_bytes,
            "orchestrator attached"
        );

        Self {
            server,
            writer: LineWriter::new(stdin),
            correlator,
            histories,
            observer,
            policy,
            next_id: AtomicU64::new(1),
            cancel,
            readers: Mutex::new(vec![reply, diagnostic]),
        }
    }

    /// Server name used in logs.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Reserve the next request id. Ids start at 1 and are never reused.
    pub fn next_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Write`] if the request could not be written.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<CallOutcome> {
        let message = Message::request(self.next_id(), method, params);
        self.send(message, options)
            .await?
            .ok_or_else(|| AppError::Rpc(format!("{method}: request produced no outcome")))
    }

    /// Send a notification; returns as soon as the line is written.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Write`] if the notification could not be written.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.send(Message::notification(method, params), CallOptions::default())
            .await
            .map(|_| ())
    }

    /// Write `message` and, for requests, wait for the correlated outcome.
    ///
    /// Returns `None` for notifications and responses, which are never
    /// answered. The observer sees the message before it is written and the
    /// outcome before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Write`] if the line could not be written. The
    /// session should be considered dead afterwards.
    pub async fn send(
        &self,
        message: Message,
        options: CallOptions,
    ) -> Result<Option<CallOutcome>> {
        self.observer.outgoing(&message);

        let Message::Request { id, method, .. } = &message else {
            self.writer.send(&message).await?;
            return Ok(None);
        };
        let id = *id;

        self.correlator.prepare(id);
        let started = Instant::now();
        if let Err(err) = self.writer.send(&message).await {
            self.correlator.abandon(id);
            return Err(err);
        }

        let (outcome, extensions) = self.wait(id, method, started, options).await;
        if matches!(outcome, CallOutcome::TimedOut | CallOutcome::Abandoned) {
            self.correlator.abandon(id);
        }

        let report = OutcomeReport {
            id,
            method: method.clone(),
            kind: outcome.kind(),
            extensions,
            elapsed: started.elapsed(),
            at: Utc::now(),
            detail: match &outcome {
                CallOutcome::ProtocolError(error) => Some(error.to_string()),
                _ => None,
            },
        };
        self.observer.outcome(&report);

        Ok(Some(outcome))
    }

    async fn wait(
        &self,
        id: RequestId,
        method: &str,
        started: Instant,
        options: CallOptions,
    ) -> (CallOutcome, u32) {
        let mut deadline = started + options.timeout;
        let mut extensions = 0_u32;

        loop {
            if let Some(response) = self.correlator.await_resolution(id, deadline).await {
                let outcome = match response.outcome {
                    Ok(result) => CallOutcome::Resolved(result),
                    Err(error) => CallOutcome::ProtocolError(error),
                };
                return (outcome, extensions);
            }

            if !options.extendable {
                debug!(server = %self.server, id, method, "deadline passed, not extendable");
                return (CallOutcome::TimedOut, extensions);
            }

            if self.correlator.is_stream_closed() {
                warn!(
                    server = %self.server,
                    id,
                    method,
                    "deadline passed after the reply stream closed, not extending"
                );
                return (CallOutcome::TimedOut, extensions);
            }

            let ctx = TimeoutContext {
                id,
                method,
                elapsed: started.elapsed(),
                extensions,
                window: options.extension_window,
            };
            match self.policy.decide(ctx).await {
                ExtensionDecision::Extend => {
                    extensions += 1;
                    self.observer.extension(id, method, options.extension_window);
                    deadline = Instant::now() + options.extension_window;
                }
                ExtensionDecision::Decline => return (CallOutcome::Abandoned, extensions),
                ExtensionDecision::Exhausted => return (CallOutcome::TimedOut, extensions),
            }
        }
    }

    /// The pending-reply table.
    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Live history buffers.
    #[must_use]
    pub fn histories(&self) -> &Histories {
        &self.histories
    }

    /// Whether the server's stdout has reached end of file.
    #[must_use]
    pub fn reply_stream_closed(&self) -> bool {
        self.correlator.is_stream_closed()
    }

    /// Copy of both histories.
    #[must_use]
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot::from(&self.histories)
    }

    /// Close the server's stdin so it sees end-of-file.
    pub async fn close_input(&self) {
        self.writer.close().await;
    }

    /// Close stdin and join both readers.
    ///
    /// Each reader gets until `drain` has elapsed to reach end of file on its
    /// own, so lines still in the pipes land in history. Readers still running
    /// after that are cancelled. Idempotent.
    pub async fn shutdown(&self, drain: Duration) {
        self.writer.close().await;

        let handles: Vec<_> = self
            .readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let drain_until = Instant::now() + drain;
        let mut running = Vec::new();
        for mut handle in handles {
            match tokio::time::timeout_at(drain_until, &mut handle).await {
                Ok(joined) => self.log_reader_exit(joined),
                Err(_) => running.push(handle),
            }
        }

        self.cancel.cancel();
        for handle in running {
            self.log_reader_exit(handle.await);
        }
        info!(server = %self.server, "orchestrator shut down");
    }

    fn log_reader_exit(&self, joined: std::result::Result<ReaderExit, JoinError>) {
        match joined {
            Ok(exit) => debug!(server = %self.server, ?exit, "reader finished"),
            Err(err) => warn!(server = %self.server, %err, "reader task failed"),
        }
    }
}
