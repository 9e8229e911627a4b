/*!
 * Ownership Acquisition
 *
 * Moves an object from `Unqueued` through `Queued` to `Granted`.
 *
 * # Protocol
 *
 * 1. Enqueue at the tail of the ordering queue and pin the buffer's current
 *    fence set.
 * 2. Wait until no earlier entry from another context on the same buffer
 *    remains (strict cross-context FCFS).
 * 3. Wait for conflicting fences: a write waits for the exclusive fence and
 *    every shared fence, a read only for the exclusive fence.
 * 4. Re-check the queue after waking and loop if overtaken.
 * 5. Arm the fence, install it, run the cache transition and leave the queue.
 *
 * # Timeouts
 *
 * A wait that runs out of time is not an error. It logs a warning and is
 * granted anyway with zero time remaining, so a stuck holder shows up as
 * repeated warnings rather than a stalled pipeline.
 */

use super::manager::SyncCore;
use super::object::{ObjectPhase, ObjectState, SyncObject};
use super::queue::{Ticket, Turn};
use crate::buffer::{AccessMode, CacheOp};
use crate::core::errors::{SyncError, SyncResult};
use crate::fence::Fence;
use crate::monitoring::stats::SyncCounters;
use crate::monitoring::WaitSpan;
use crate::reservation::FenceSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Shared time bound for one wait call
///
/// `wait_all` acquires several objects against a single deadline.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    timeout: Duration,
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn new(timeout: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            timeout,
            at: start.checked_add(timeout),
        }
    }

    /// Absolute deadline, `None` if it does not fit in an `Instant`
    #[inline]
    pub(crate) fn instant(&self) -> Option<Instant> {
        self.at
    }

    #[inline]
    pub(crate) fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.start.elapsed())
    }

    #[inline]
    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

enum Waited {
    Granted,
    TimedOut,
}

impl SyncCore {
    /// Acquire ownership of `object`'s buffer in the object's access mode
    ///
    /// Returns the time left on `deadline`, zero if the wait timed out.
    /// Waiting on an already granted object is a no-op.
    pub(crate) fn acquire(
        &self,
        object: &Arc<SyncObject>,
        deadline: &Deadline,
    ) -> SyncResult<Duration> {
        let buffer_id = object.buffer().id();

        let (ticket, mode, fence) = {
            let mut state = object.state();
            match state.phase {
                ObjectPhase::Granted => return Ok(deadline.remaining()),
                ObjectPhase::Queued => return Err(SyncError::Busy(buffer_id)),
                ObjectPhase::Unqueued => {}
            }
            // A signalled fence belongs to the previous grant
            let fence = match state.fence.as_ref() {
                Some(fence) if !fence.is_signaled() => Arc::clone(fence),
                _ => {
                    let fence = self.new_fence(object.owner(), state.mode);
                    state.fence = Some(Arc::clone(&fence));
                    fence
                }
            };
            let ticket = self.queue.enqueue(object);
            state.phase = ObjectPhase::Queued;
            state.ticket = Some(ticket);
            (ticket, state.mode, fence)
        };

        let mut span = WaitSpan::new(object.owner(), buffer_id, mode);
        let result = {
            let _entered = span.enter();
            self.wait_queued(object, ticket, mode, &fence, deadline)
        };

        match result {
            Ok(Waited::Granted) => {
                span.record_outcome("granted");
                Ok(deadline.remaining())
            }
            Ok(Waited::TimedOut) => {
                span.record_outcome("timeout");
                Ok(Duration::ZERO)
            }
            Err(e) => {
                span.record_outcome("aborted");
                Err(e)
            }
        }
    }

    fn wait_queued(
        &self,
        object: &SyncObject,
        ticket: Ticket,
        mode: AccessMode,
        fence: &Fence,
        deadline: &Deadline,
    ) -> SyncResult<Waited> {
        let reservation = object.buffer().reservation();
        let pinned = reservation.snapshot();
        let mut timed_out = false;

        loop {
            match self.queue.wait_turn(ticket, deadline.instant()) {
                Turn::Ready => {}
                Turn::Overtaken(_) => {
                    timed_out = true;
                    break;
                }
                Turn::Aborted => return Err(self.abandon(object, ticket)),
            }

            // Our own fence signals when the wait is withdrawn
            let clear = reservation.wait_conflicts(
                Some(object.owner()),
                mode.is_write(),
                deadline.remaining(),
                Some(fence),
            );

            match self.queue.turn(ticket) {
                Turn::Aborted => return Err(self.abandon(object, ticket)),
                _ if !clear => {
                    timed_out = true;
                    break;
                }
                Turn::Ready => break,
                Turn::Overtaken(_) => continue,
            }
        }

        if timed_out {
            SyncCounters::bump(&self.counters.timeouts);
            warn!(
                context = %object.owner(),
                buffer = %object.buffer().id(),
                mode = ?mode,
                elapsed_ms = deadline.elapsed().as_millis() as u64,
                "buffer wait timed out, proceeding"
            );
        }

        self.grant(object, ticket, pinned)?;
        Ok(if timed_out {
            Waited::TimedOut
        } else {
            Waited::Granted
        })
    }

    /// Install the object's fence and leave the queue
    fn grant(&self, object: &SyncObject, ticket: Ticket, pinned: FenceSet) -> SyncResult<()> {
        let buffer = object.buffer();
        let reservation = buffer.reservation();
        let mut state = object.state();

        let armed = match (state.ticket, state.fence.as_ref()) {
            (Some(t), Some(fence)) if t == ticket && fence.arm() => Some(Arc::clone(fence)),
            _ => None,
        };
        let Some(fence) = armed else {
            self.reset(&mut state, ticket);
            return Err(SyncError::Aborted(buffer.id()));
        };
        let mode = state.mode;

        if !mode.is_write() {
            if let Err(e) = reservation.reserve_shared(1) {
                self.reset(&mut state, ticket);
                return Err(e);
            }
        }

        let installed = if mode.is_write() {
            reservation.install_exclusive(Arc::clone(&fence))
        } else {
            reservation.append_shared(Arc::clone(&fence))
        };
        if !installed {
            self.reset(&mut state, ticket);
            return Err(SyncError::Aborted(buffer.id()));
        }
        drop(pinned);

        let next = mode.access_type();
        let previous = reservation.record_access(next);
        CacheOp::for_transition(previous, next).apply(self.cache.as_ref(), buffer);

        if !mode.is_write() {
            if let Some(reclaim) = &self.reclaim {
                reclaim.arm(buffer.id(), fence);
            }
        }

        self.queue.remove(ticket);
        state.phase = ObjectPhase::Granted;
        state.ticket = None;
        SyncCounters::bump(&self.counters.grants);
        Ok(())
    }

    /// Back out of a wait whose ticket was withdrawn
    fn abandon(&self, object: &SyncObject, ticket: Ticket) -> SyncError {
        let mut state = object.state();
        self.reset(&mut state, ticket);
        SyncError::Aborted(object.buffer().id())
    }

    fn reset(&self, state: &mut ObjectState, ticket: Ticket) {
        if state.ticket == Some(ticket) {
            state.ticket = None;
            state.phase = ObjectPhase::Unqueued;
        }
        self.queue.remove(ticket);
    }
}
