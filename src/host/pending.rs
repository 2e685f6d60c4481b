//! Pending-reply table keyed by peer id.
//!
//! A `query`/`receive` caller registers a handler *before* anything is
//! sent, so a fast reply can never slip past it. An inbound frame
//! satisfies **every** handler waiting on its peer id
//! (broadcast-to-waiters, not first-match-wins), consuming each one.
//!
//! Handler lifetime is bounded: the caller that registered a handler
//! removes it by ticket when its deadline expires, so a stale wait can
//! never be resolved by an unrelated later frame.

use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::trace;

use crate::protocol::Frame;

/// Opaque registration id used to withdraw a handler on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

struct Entry {
    peer_id: u8,
    ticket: Ticket,
    tx: oneshot::Sender<Frame>,
}

/// Table of handlers awaiting a reply, shared by callers and the reader.
pub struct PendingTable {
    inner: Mutex<Inner>,
}

struct Inner {
    entries: Vec<Entry>,
    next_ticket: u64,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                next_ticket: 0,
            }),
        }
    }

    /// Register a handler for the next frame from `peer_id`.
    ///
    /// Multiple handlers for the same peer id may coexist; all of them
    /// are satisfied by one matching frame.
    pub fn register(&self, peer_id: u8) -> (Ticket, oneshot::Receiver<Frame>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("pending table poisoned");
        let ticket = Ticket(inner.next_ticket);
        inner.next_ticket += 1;
        inner.entries.push(Entry { peer_id, ticket, tx });
        (ticket, rx)
    }

    /// Withdraw a handler that timed out. Returns false if it was
    /// already consumed by a reply.
    pub fn remove(&self, ticket: Ticket) -> bool {
        let mut inner = self.inner.lock().expect("pending table poisoned");
        let before = inner.entries.len();
        inner.entries.retain(|e| e.ticket != ticket);
        inner.entries.len() < before
    }

    /// Deliver a frame to every handler waiting on its peer id,
    /// consuming them. Returns the number of handlers woken.
    pub fn resolve(&self, frame: &Frame) -> usize {
        // Drain matching entries under the lock, complete them after,
        // so no other synchronization happens while it is held.
        let matching: Vec<Entry> = {
            let mut inner = self.inner.lock().expect("pending table poisoned");
            let mut kept = Vec::with_capacity(inner.entries.len());
            let mut taken = Vec::new();
            for entry in inner.entries.drain(..) {
                if entry.peer_id == frame.peer_id {
                    taken.push(entry);
                } else {
                    kept.push(entry);
                }
            }
            inner.entries = kept;
            taken
        };

        let mut woken = 0;
        for entry in matching {
            // A receiver dropped between timeout and removal is harmless.
            if entry.tx.send(frame.clone()).is_ok() {
                woken += 1;
            } else {
                trace!(peer_id = frame.peer_id, "pending handler abandoned");
            }
        }
        woken
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending table poisoned").entries.len()
    }

    /// Check whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}
