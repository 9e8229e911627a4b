/*!
 * Synchronization Statistics
 * Live-allocation tracking and event counters for diagnostics
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts live instances of one kind of allocation
///
/// Cloning shares the count. Each tracked instance holds a [`LiveToken`].
#[derive(Debug, Clone, Default)]
pub struct LiveTracker {
    live: Arc<AtomicUsize>,
}

impl LiveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one live instance until the returned token drops
    pub fn acquire(&self) -> LiveToken {
        self.live.fetch_add(1, Ordering::AcqRel);
        LiveToken {
            live: Arc::clone(&self.live),
        }
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// Registration of one live instance
#[derive(Debug)]
pub struct LiveToken {
    live: Arc<AtomicUsize>,
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Monotonic event counters
///
/// # Performance
/// - Cache-line aligned so hot counters do not share a line with manager state
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct SyncCounters {
    pub grants: AtomicU64,
    pub timeouts: AtomicU64,
    pub aborts: AtomicU64,
    pub signals: AtomicU64,
    pub forced_releases: AtomicU64,
}

impl SyncCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of the synchronization manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncStats {
    pub live_fences: usize,
    pub live_objects: usize,
    pub live_contexts: usize,
    pub queued_waits: usize,
    pub pending_reclaims: usize,
    pub single_objects: usize,
    pub grants: u64,
    pub timeouts: u64,
    pub aborts: u64,
    pub signals: u64,
    pub forced_releases: u64,
}

impl SyncStats {
    /// True when nothing allocated by the subsystem is still alive
    pub fn is_quiescent(&self) -> bool {
        self.live_fences == 0
            && self.live_objects == 0
            && self.queued_waits == 0
            && self.pending_reclaims == 0
    }
}
