/*!
 * Reservation State
 *
 * Per-buffer record of outstanding fences: at most one exclusive (write)
 * fence plus a set of shared (read) fences, together with the domain of the
 * last granted access.
 *
 * # Locking
 *
 * One mutex guards the fence set. It is never held while blocking on a
 * fence: waits snapshot ("pin") the fences they need and release the lock.
 *
 * # Pruning
 *
 * Every installed fence carries a signal callback that removes it from the
 * set, so a released grant stops showing up as soon as it signals.
 */

use crate::buffer::AccessType;
use crate::core::errors::SyncResult;
use crate::core::limits::SHARED_FENCE_INITIAL_CAPACITY;
use crate::core::types::{BufferId, ContextId, FenceId};
use crate::fence::Fence;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

struct ReservationInner {
    exclusive: Option<Arc<Fence>>,
    shared: Vec<Arc<Fence>>,
    last_access: AccessType,
}

/// Pinned references to a reservation's fences
///
/// Holding a snapshot keeps every fence in it alive.
#[derive(Debug, Clone, Default)]
pub struct FenceSet {
    pub exclusive: Option<Arc<Fence>>,
    pub shared: Vec<Arc<Fence>>,
}

impl FenceSet {
    pub fn len(&self) -> usize {
        self.shared.len() + usize::from(self.exclusive.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Reservation {
    buffer: BufferId,
    inner: Mutex<ReservationInner>,
}

impl Reservation {
    pub fn new(buffer: BufferId) -> Self {
        Self {
            buffer,
            inner: Mutex::new(ReservationInner {
                exclusive: None,
                shared: Vec::with_capacity(SHARED_FENCE_INITIAL_CAPACITY),
                last_access: AccessType::None,
            }),
        }
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn exclusive_fence(&self) -> Option<Arc<Fence>> {
        self.inner.lock().exclusive.clone()
    }

    pub fn shared_fences(&self) -> Vec<Arc<Fence>> {
        self.inner.lock().shared.clone()
    }

    /// Pin the current fence set
    pub fn snapshot(&self) -> FenceSet {
        let inner = self.inner.lock();
        FenceSet {
            exclusive: inner.exclusive.clone(),
            shared: inner.shared.clone(),
        }
    }

    /// True when no unsignalled fence is outstanding
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock();
        inner.exclusive.as_ref().map_or(true, |f| f.is_signaled())
            && inner.shared.iter().all(|f| f.is_signaled())
    }

    pub fn last_access(&self) -> AccessType {
        self.inner.lock().last_access
    }

    /// Record a newly granted access, returning the previous one
    pub fn record_access(&self, access: AccessType) -> AccessType {
        std::mem::replace(&mut self.inner.lock().last_access, access)
    }

    /// Make room for `additional` shared fences
    pub fn reserve_shared(&self, additional: usize) -> SyncResult<()> {
        self.inner.lock().shared.try_reserve(additional)?;
        Ok(())
    }

    /// Install a write grant, dropping every prior shared fence
    ///
    /// Returns `false` if the fence had already signalled and was not installed.
    pub fn install_exclusive(self: &Arc<Self>, fence: Arc<Fence>) -> bool {
        let mut inner = self.inner.lock();
        if fence.add_callback(self.prune_callback()).is_err() {
            return false;
        }
        inner.shared.clear();
        inner.exclusive = Some(fence);
        true
    }

    /// Append a read grant to the shared set
    ///
    /// Capacity should have been reserved with [`Reservation::reserve_shared`];
    /// otherwise the push may reallocate under the lock.
    pub fn append_shared(self: &Arc<Self>, fence: Arc<Fence>) -> bool {
        let mut inner = self.inner.lock();
        if fence.add_callback(self.prune_callback()).is_err() {
            return false;
        }
        inner.shared.push(fence);
        true
    }

    fn prune_callback(self: &Arc<Self>) -> Box<dyn FnOnce(&Fence) + Send + 'static> {
        let weak: Weak<Reservation> = Arc::downgrade(self);
        Box::new(move |fence: &Fence| {
            if let Some(reservation) = weak.upgrade() {
                reservation.prune(fence.id());
            }
        })
    }

    /// Drop a signalled fence from the set
    fn prune(&self, id: FenceId) {
        let mut inner = self.inner.lock();
        if inner.exclusive.as_ref().is_some_and(|f| f.id() == id) {
            inner.exclusive = None;
        }
        inner.shared.retain(|f| f.id() != id);
        trace!(buffer = %self.buffer, fence = %id, "pruned signalled fence");
    }

    /// Block until the fences conflicting with a request have signalled
    ///
    /// A write request (`wait_all`) waits for the exclusive fence and every
    /// shared fence; a read request waits for the exclusive fence only.
    /// Fences owned by `skip_owner` never block. Returns `false` on timeout.
    pub fn wait_timeout(
        &self,
        skip_owner: Option<ContextId>,
        wait_all: bool,
        timeout: Duration,
    ) -> bool {
        self.wait_conflicts(skip_owner, wait_all, timeout, None)
    }

    /// [`Reservation::wait_timeout`] that also gives up once `interrupt` signals
    ///
    /// Returns `false` on timeout or interruption.
    pub fn wait_conflicts(
        &self,
        skip_owner: Option<ContextId>,
        wait_all: bool,
        timeout: Duration,
        interrupt: Option<&Fence>,
    ) -> bool {
        let pinned: Vec<Arc<Fence>> = {
            let inner = self.inner.lock();
            let shared: &[Arc<Fence>] = if wait_all { &inner.shared } else { &[] };
            inner
                .exclusive
                .iter()
                .chain(shared.iter())
                .filter(|f| !f.is_signaled() && Some(f.context()) != skip_owner)
                .cloned()
                .collect()
        };

        let start = Instant::now();
        for fence in &pinned {
            let remaining = timeout.saturating_sub(start.elapsed());
            let signaled = match interrupt {
                Some(interrupt) => fence.wait_interruptible(remaining, interrupt),
                None => fence.wait_timeout(remaining),
            };
            if !signaled {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Reservation")
            .field("buffer", &self.buffer)
            .field("exclusive", &inner.exclusive.as_ref().map(|f| f.id()))
            .field("shared", &inner.shared.len())
            .field("last_access", &inner.last_access)
            .finish()
    }
}
