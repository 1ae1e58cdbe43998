//! Bounded history of raw stream lines.
//!
//! Each session keeps two [`HistoryBuffer`]s, one for the reply stream
//! (stdout) and one for the diagnostic stream (stderr). The owning reader
//! task is the only writer; callers only take snapshots.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Default number of lines retained per stream.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Fixed-capacity FIFO of raw lines with ring-buffer eviction.
#[derive(Debug)]
pub struct HistoryBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl HistoryBuffer {
    /// Create an empty buffer holding at most `capacity` lines.
    ///
    /// A zero capacity yields a buffer that retains nothing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY))),
        }
    }

    /// Append a line, evicting the oldest one when full.
    pub fn push(&self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Copy of every retained line, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect()
    }

    /// Copy of the `n` most recent lines, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    /// Number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no line is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained lines.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The pair of histories belonging to one session.
#[derive(Debug, Clone)]
pub struct Histories {
    /// Raw lines read from the server's stdout.
    pub replies: Arc<HistoryBuffer>,
    /// Raw lines read from the server's stderr.
    pub diagnostics: Arc<HistoryBuffer>,
}

impl Histories {
    /// Two empty buffers of the same capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            replies: Arc::new(HistoryBuffer::new(capacity)),
            diagnostics: Arc::new(HistoryBuffer::new(capacity)),
        }
    }
}

/// Point-in-time copy of both histories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySnapshot {
    /// Reply-stream lines, oldest first.
    pub replies: Vec<String>,
    /// Diagnostic-stream lines, oldest first.
    pub diagnostics: Vec<String>,
}

impl From<&Histories> for HistorySnapshot {
    fn from(histories: &Histories) -> Self {
        Self {
            replies: histories.replies.snapshot(),
            diagnostics: histories.diagnostics.snapshot(),
        }
    }
}
