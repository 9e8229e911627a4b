/*!
 * Ordering Queue
 *
 * Process-wide FIFO of outstanding, not-yet-granted waits. An entry's
 * presence means its wait is still pending; the entry is removed when the
 * wait is granted, aborted, or its context is destroyed.
 *
 * # Fairness
 *
 * A waiter may proceed only when no entry from a *different* execution
 * context on the *same* buffer precedes it. Entries from its own context
 * never block it, so a context cannot deadlock against itself.
 *
 * # Waiting
 *
 * Waiters that are overtaken sleep on the queue's condition variable, which
 * is notified whenever an entry leaves the queue, and re-check on wake.
 */

use super::object::SyncObject;
use crate::core::types::{BufferId, ContextId};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Insertion order of a queued wait
pub(crate) type Ticket = u64;

struct QueueEntry {
    ticket: Ticket,
    owner: ContextId,
    buffer: BufferId,
    // Keeps the object alive across a concurrent context teardown
    _object: Arc<SyncObject>,
}

/// Result of a fairness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Turn {
    /// No earlier entry from another context on this buffer
    Ready,
    /// An earlier entry from the given context is still pending
    Overtaken(ContextId),
    /// The ticket is no longer queued
    Aborted,
}

struct QueueInner {
    entries: VecDeque<QueueEntry>,
    next_ticket: Ticket,
}

pub(crate) struct OrderingQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl OrderingQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::new(),
                next_ticket: 1,
            }),
            cond: Condvar::new(),
        }
    }

    /// Append an object to the tail, returning its ticket
    pub(crate) fn enqueue(&self, object: &Arc<SyncObject>) -> Ticket {
        let mut inner = self.inner.lock();
        // Issued under the queue lock so ticket order equals queue order
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        inner.entries.push_back(QueueEntry {
            ticket,
            owner: object.owner(),
            buffer: object.buffer().id(),
            _object: Arc::clone(object),
        });
        ticket
    }

    fn check(entries: &VecDeque<QueueEntry>, ticket: Ticket) -> Turn {
        let Ok(pos) = entries.binary_search_by_key(&ticket, |e| e.ticket) else {
            return Turn::Aborted;
        };
        let me = &entries[pos];
        entries
            .range(..pos)
            .find(|e| e.buffer == me.buffer && e.owner != me.owner)
            .map_or(Turn::Ready, |e| Turn::Overtaken(e.owner))
    }

    /// Fairness check for a queued ticket
    pub(crate) fn turn(&self, ticket: Ticket) -> Turn {
        Self::check(&self.inner.lock().entries, ticket)
    }

    /// Sleep until the ticket is no longer overtaken or the deadline passes
    ///
    /// Returns [`Turn::Overtaken`] only when the deadline expired first.
    pub(crate) fn wait_turn(&self, ticket: Ticket, deadline: Option<Instant>) -> Turn {
        let mut inner = self.inner.lock();
        loop {
            let turn = Self::check(&inner.entries, ticket);
            if !matches!(turn, Turn::Overtaken(_)) {
                return turn;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut inner, deadline).timed_out() {
                        return Self::check(&inner.entries, ticket);
                    }
                }
                None => self.cond.wait(&mut inner),
            }
        }
    }

    /// Remove a ticket, waking every overtaken waiter
    pub(crate) fn remove(&self, ticket: Ticket) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            match inner.entries.binary_search_by_key(&ticket, |e| e.ticket) {
                Ok(pos) => inner.entries.remove(pos),
                Err(_) => None,
            }
        };
        let found = removed.is_some();
        if found {
            self.cond.notify_all();
        }
        // Object reference released outside the queue lock
        drop(removed);
        found
    }

    /// Remove every entry belonging to a context
    pub(crate) fn purge_owner(&self, owner: ContextId) -> usize {
        let purged: Vec<QueueEntry> = {
            let mut inner = self.inner.lock();
            let (gone, kept): (VecDeque<_>, VecDeque<_>) =
                inner.entries.drain(..).partition(|e| e.owner == owner);
            inner.entries = kept;
            gone.into()
        };
        if !purged.is_empty() {
            self.cond.notify_all();
        }
        purged.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Queue position of a ticket (0 = head)
    #[cfg(test)]
    pub(crate) fn position(&self, ticket: Ticket) -> Option<usize> {
        self.inner
            .lock()
            .entries
            .binary_search_by_key(&ticket, |e| e.ticket)
            .ok()
    }
}
