//! Reply correlation by request id.
//!
//! The [`Correlator`] holds the pending table: one slot per id, each with an
//! optional deposited [`Response`] and its own [`Notify`] handle. A single
//! mutex guards the whole table, so depositing a response and signalling its
//! slot happen atomically with respect to a waiter checking that slot.
//! Waking is per id: a deposit for id 7 never wakes a waiter of id 8.
//!
//! [`Notify::notify_one`] stores a permit when nobody is parked yet, which
//! closes the window between a waiter releasing the lock and starting to
//! wait.
//!
//! The reply reader marks the table closed when stdout ends. Waiters are
//! not woken by this; they read the flag once their deadline passes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::rpc::message::{RequestId, Response};

/// Result of [`Correlator::deposit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deposit {
    /// Stored in an empty slot.
    Stored,
    /// Overwrote an unconsumed response for the same id.
    Replaced,
    /// The id was given up on earlier; the response was dropped.
    Discarded,
}

#[derive(Debug, Default)]
struct Slot {
    response: Option<Response>,
    wake: Arc<Notify>,
}

#[derive(Debug, Default)]
struct PendingTable {
    slots: HashMap<RequestId, Slot>,
    /// Ids whose callers timed out or gave up.
    abandoned: HashSet<RequestId>,
}

/// Guarded id → response table with per-id wake-up.
#[derive(Debug, Default)]
pub struct Correlator {
    table: Mutex<PendingTable>,
    /// Set once the reply stream has ended; no response can arrive after.
    stream_closed: AtomicBool,
}

impl Correlator {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear any stale state for `id` before its request is written.
    pub fn prepare(&self, id: RequestId) {
        let mut table = self.lock();
        table.abandoned.remove(&id);
        if let Some(slot) = table.slots.get_mut(&id) {
            slot.response = None;
        }
    }

    /// Store `response` under its id and wake the waiter of that id.
    ///
    /// An unconsumed response with the same id is overwritten (last write
    /// wins). Responses for abandoned ids are dropped.
    pub fn deposit(&self, response: Response) -> Deposit {
        let id = response.id;
        let mut table = self.lock();

        if table.abandoned.contains(&id) {
            debug!(id, "correlator: late response for abandoned id dropped");
            return Deposit::Discarded;
        }

        let slot = table.slots.entry(id).or_default();
        let replaced = slot.response.replace(response).is_some();
        slot.wake.notify_one();

        if replaced {
            debug!(id, "correlator: unconsumed response overwritten");
            Deposit::Replaced
        } else {
            Deposit::Stored
        }
    }

    /// Wait until a response for `id` is deposited or `deadline` passes.
    ///
    /// Returns `Some(response)` and removes the entry (at-most-once
    /// delivery), or `None` on timeout. A response that lands exactly at
    /// the deadline is still delivered.
    pub async fn await_resolution(&self, id: RequestId, deadline: Instant) -> Option<Response> {
        loop {
            let wake = {
                let mut table = self.lock();
                let slot = table.slots.entry(id).or_default();
                if slot.response.is_some() {
                    return table.slots.remove(&id).and_then(|slot| slot.response);
                }
                Arc::clone(&slot.wake)
            };

            if tokio::time::timeout_at(deadline, wake.notified()).await.is_err() {
                return self.take(id);
            }
        }
    }

    /// Remove and return a deposited response without waiting.
    ///
    /// An empty slot for `id` is dropped as well.
    pub fn take(&self, id: RequestId) -> Option<Response> {
        let mut table = self.lock();
        match table.slots.get(&id) {
            Some(slot) if slot.response.is_some() => {
                table.slots.remove(&id).and_then(|slot| slot.response)
            }
            Some(_) => {
                table.slots.remove(&id);
                None
            }
            None => None,
        }
    }

    /// Give up on `id`: purge its slot and drop any response arriving later.
    pub fn abandon(&self, id: RequestId) {
        let mut table = self.lock();
        table.slots.remove(&id);
        table.abandoned.insert(id);
    }

    /// Whether a response for `id` is deposited and unconsumed.
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.lock()
            .slots
            .get(&id)
            .is_some_and(|slot| slot.response.is_some())
    }

    /// Number of deposited, unconsumed responses.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| slot.response.is_some())
            .count()
    }

    /// Record that the reply stream reached end of file or failed.
    pub fn close_stream(&self) {
        self.stream_closed.store(true, Ordering::Release);
    }

    /// Whether the reply stream has ended.
    #[must_use]
    pub fn is_stream_closed(&self) -> bool {
        self.stream_closed.load(Ordering::Acquire)
    }

    /// Whether `id` was abandoned.
    #[must_use]
    pub fn is_abandoned(&self, id: RequestId) -> bool {
        self.lock().abandoned.contains(&id)
    }
}
