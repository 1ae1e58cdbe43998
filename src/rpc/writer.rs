//! Line-framed writer over the server's stdin.
//!
//! Every [`Message`] is serialised to one compact JSON line and pushed
//! through a [`FramedWrite`] backed by [`LineCodec`]. The sink sits behind a
//! single async mutex, so the request path and the notification path can
//! share one writer without interleaving partial lines.

use futures_util::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

use crate::rpc::codec::LineCodec;
use crate::rpc::message::Message;
use crate::{AppError, Result};

/// Boxed byte sink the writer is built over.
pub type BoxedSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Serialised writer for outgoing messages.
pub struct LineWriter {
    sink: Mutex<Option<FramedWrite<BoxedSink, LineCodec>>>,
}

impl std::fmt::Debug for LineWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineWriter").finish_non_exhaustive()
    }
}

impl LineWriter {
    /// Wrap any async byte sink, typically a `ChildStdin`.
    pub fn new<W>(sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: BoxedSink = Box::new(sink);
        Self {
            sink: Mutex::new(Some(FramedWrite::new(boxed, LineCodec::new()))),
        }
    }

    /// Write `message` as one newline-terminated line and flush it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Write`] if the stream is closed or broken. The
    /// failure is fatal for the session; the message is not retried.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let line = message.to_line()?;
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(AppError::Write("stdin already closed".into()));
        };

        sink.send(line).await.map_err(|err| {
            warn!(error = %err, method = message.method(), "writer: write to stdin failed");
            AppError::Write(format!("write failed: {err}"))
        })?;

        debug!(id = message.id(), method = message.method(), "writer: line sent");
        Ok(())
    }

    /// Flush and close stdin so the server sees end-of-file.
    ///
    /// Idempotent; later [`send`](Self::send) calls fail with
    /// [`AppError::Write`].
    pub async fn close(&self) {
        let Some(sink) = self.sink.lock().await.take() else {
            return;
        };
        let mut inner = sink.into_inner();
        if let Err(err) = inner.shutdown().await {
            debug!(error = %err, "writer: shutdown of stdin failed");
        }
    }
}
