//! Reader tasks for the server's stdout and stderr.
//!
//! Both readers drive a [`FramedRead`] with [`LineCodec`] until end of
//! stream or cancellation. Every non-empty line lands in the stream's
//! [`HistoryBuffer`] first, unconditionally, so garbled input stays in the
//! audit trail even when it is dropped from correlation.
//!
//! The reply reader then parses and classifies the line:
//!
//! | Classification           | Action                                   |
//! |--------------------------|------------------------------------------|
//! | not JSON                 | skipped, logged at `DEBUG`               |
//! | [`Inbound::Response`]    | deposited into the [`Correlator`]        |
//! | anything else            | handed to [`Observer::unhandled`]        |
//!
//! A line longer than the configured limit keeps only its head in history
//! and is reported through [`Observer::line_truncated`]; it is never parsed.
//! On end of stream the reply reader marks the [`Correlator`] closed.
//!
//! The diagnostic reader never parses.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::observer::{Observer, StreamKind};
use crate::rpc::codec::{Line, LineCodec};
use crate::rpc::correlator::Correlator;
use crate::rpc::history::HistoryBuffer;
use crate::rpc::message::Inbound;

/// Why a reader stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The stream reached end of file.
    Eof,
    /// The session was stopped.
    Cancelled,
    /// The stream failed.
    Failed(String),
}

/// Handle one raw reply-stream line.
///
/// Exposed separately from [`run_reply_reader`] so the classification path
/// can be exercised without a stream.
pub fn dispatch_reply_line(
    line: &str,
    history: &HistoryBuffer,
    correlator: &Correlator,
    observer: &dyn Observer,
) {
    if line.trim().is_empty() {
        return;
    }

    history.push(line);
    observer.reply_line(line);

    match Inbound::parse(line) {
        Ok(Inbound::Response(response)) => {
            let id = response.id;
            let deposit = correlator.deposit(response);
            debug!(id, ?deposit, "reply reader: response deposited");
        }
        Ok(other) => {
            debug!(kind = other.kind(), "reply reader: not a response, dropped");
            observer.unhandled(&other);
        }
        Err(e) => {
            debug!(error = %e, "reply reader: non-JSON line, skipped");
        }
    }
}

/// Reply dispatcher: reads stdout until EOF or cancellation.
pub async fn run_reply_reader<R>(
    server: String,
    stdout: R,
    max_line_bytes: usize,
    history: Arc<HistoryBuffer>,
    correlator: Arc<Correlator>,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
) -> ReaderExit
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, LineCodec::with_max_length(max_line_bytes));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(server = %server, "reply reader: cancellation received, stopping");
                return ReaderExit::Cancelled;
            }

            item = framed.next() => match item {
                None => {
                    debug!(server = %server, "reply reader: EOF detected");
                    correlator.close_stream();
                    return ReaderExit::Eof;
                }
                Some(Err(e)) => {
                    warn!(server = %server, error = %e, "reply reader: stream error, stopping");
                    correlator.close_stream();
                    return ReaderExit::Failed(e.to_string());
                }
                Some(Ok(Line::Complete(line))) => {
                    dispatch_reply_line(&line, &history, &correlator, observer.as_ref());
                }
                Some(Ok(Line::Truncated { head, limit })) => {
                    warn!(server = %server, limit, "reply reader: over-long line truncated");
                    history.push(head);
                    observer.line_truncated(StreamKind::Stdout, limit);
                }
            }
        }
    }
}

/// Diagnostic dispatcher: reads stderr until EOF or cancellation.
pub async fn run_diagnostic_reader<R>(
    server: String,
    stderr: R,
    max_line_bytes: usize,
    history: Arc<HistoryBuffer>,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
) -> ReaderExit
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stderr, LineCodec::with_max_length(max_line_bytes));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(server = %server, "diagnostic reader: cancellation received, stopping");
                return ReaderExit::Cancelled;
            }

            item = framed.next() => match item {
                None => {
                    debug!(server = %server, "diagnostic reader: EOF detected");
                    return ReaderExit::Eof;
                }
                Some(Err(e)) => {
                    warn!(
                        server = %server,
                        error = %e,
                        "diagnostic reader: stream error, stopping"
                    );
                    return ReaderExit::Failed(e.to_string());
                }
                Some(Ok(Line::Complete(line))) => {
                    if !line.trim().is_empty() {
                        history.push(line.as_str());
                        observer.diagnostic_line(&line);
                    }
                }
                Some(Ok(Line::Truncated { head, limit })) => {
                    history.push(head);
                    observer.line_truncated(StreamKind::Stderr, limit);
                }
            }
        }
    }
}
