/*!
 * ID Generation System
 * Process-wide monotonic counters for type-safe identifiers
 */

use super::types::{BufferId, ContextId, FenceId, ObjectId};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free monotonic ID generator
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - IDs are never recycled, so a stale handle can never alias a live one
#[repr(C, align(64))]
pub struct AtomicGenerator<T> {
    counter: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: From<u64>> AtomicGenerator<T> {
    /// Create new generator starting at given value
    pub const fn new(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
            _marker: PhantomData,
        }
    }

    /// Generate next ID
    #[inline]
    pub fn next(&self) -> T {
        T::from(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Peek at the value the next call will return (for debugging)
    #[inline]
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

// Context IDs are shared between SyncContexts and single-object thread owners,
// so they come from one process-wide counter regardless of manager instance.
static BUFFER_IDS: AtomicGenerator<BufferId> = AtomicGenerator::new(1);
static CONTEXT_IDS: AtomicGenerator<ContextId> = AtomicGenerator::new(1);
static FENCE_IDS: AtomicGenerator<FenceId> = AtomicGenerator::new(1);
static OBJECT_IDS: AtomicGenerator<ObjectId> = AtomicGenerator::new(1);

#[inline]
pub fn next_buffer_id() -> BufferId {
    BUFFER_IDS.next()
}

#[inline]
pub fn next_context_id() -> ContextId {
    CONTEXT_IDS.next()
}

#[inline]
pub fn next_fence_id() -> FenceId {
    FENCE_IDS.next()
}

#[inline]
pub fn next_object_id() -> ObjectId {
    OBJECT_IDS.next()
}
