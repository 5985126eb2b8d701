//! Bounded registry of in-flight, cancelable requests.
//!
//! # Design
//! Entries are keyed by request id and mirrored in a FIFO queue that is used
//! only to pick the oldest entry for eviction. Each entry owns the sending
//! half of a oneshot channel; canceling sends the reason to the waiting
//! request, while plain removal drops the sender and the waiter keeps
//! running.
//!
//! Each registration also gets a ticket. Completion cleanup goes through
//! `release`, which only removes the entry when the ticket still matches, so
//! a superseded request that settles late cannot evict its successor.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const DEFAULT_MAX_PENDING: usize = 50;
pub const SUPERSEDED_REASON: &str = "superseded by duplicate request";
pub const EVICTED_REASON: &str = "evicted: pending-request limit exceeded";

struct PendingEntry {
    ticket: u64,
    cancel: oneshot::Sender<String>,
}

/// Handle returned to the request that was just registered.
#[derive(Debug)]
pub struct Registration {
    pub id: String,
    pub ticket: u64,
    pub canceled: oneshot::Receiver<String>,
}

pub struct PendingRegistry {
    entries: HashMap<String, PendingEntry>,
    queue: VecDeque<String>,
    capacity: usize,
    next_ticket: u64,
}

impl PendingRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            next_ticket: 0,
        }
    }

    /// Track a new request under `id`.
    ///
    /// A pending request with the same id is canceled first (last write
    /// wins), then the oldest entries are evicted until there is room.
    pub fn register(&mut self, id: String) -> Registration {
        self.cancel(&id, Some(SUPERSEDED_REASON));

        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.queue.front().cloned() else {
                break;
            };
            self.cancel(&oldest, Some(EVICTED_REASON));
        }

        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.queue.push_back(id.clone());
        self.entries.insert(id.clone(), PendingEntry { ticket, cancel: tx });
        debug!(request_id = %id, ticket, pending = self.entries.len(), "registered pending request");

        Registration {
            id,
            ticket,
            canceled: rx,
        }
    }

    /// Remove the entry for `id`. With a reason, the waiting request is
    /// canceled; without one, only the bookkeeping is cleared.
    ///
    /// Returns `false` when nothing was registered under `id`.
    pub fn cancel(&mut self, id: &str, reason: Option<&str>) -> bool {
        let Some(entry) = self.remove(id) else {
            return false;
        };
        if let Some(reason) = reason {
            warn!(request_id = %id, reason, "canceling pending request");
            // The receiver is gone if the request already settled.
            let _ = entry.cancel.send(reason.to_string());
        }
        true
    }

    /// Cancel every pending request in registration order.
    pub fn cancel_all(&mut self, reason: &str) -> usize {
        let ids: Vec<String> = self.queue.iter().cloned().collect();
        ids.iter().filter(|id| self.cancel(id, Some(reason))).count()
    }

    /// Completion cleanup for the request holding `ticket`.
    pub fn release(&mut self, id: &str, ticket: u64) {
        if self.entries.get(id).is_some_and(|entry| entry.ticket == ticket) {
            self.remove(id);
            debug!(request_id = %id, ticket, "released pending request");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending ids, oldest first.
    pub fn ids(&self) -> Vec<String> {
        self.queue.iter().cloned().collect()
    }

    fn remove(&mut self, id: &str) -> Option<PendingEntry> {
        let entry = self.entries.remove(id)?;
        if let Some(pos) = self.queue.iter().position(|queued| queued == id) {
            self.queue.remove(pos);
        }
        Some(entry)
    }
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}
