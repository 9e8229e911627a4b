/*!
 * Fences
 *
 * A fence is the signalable token behind one access grant. It is created with
 * its sync object, armed when the grant is installed into a reservation, and
 * signalled exactly once when the holder releases the access.
 *
 * # Lifetime
 *
 * Fences are shared through `Arc`. The reservation, the owning object, any
 * blocked waiter and the deferred-reclaim timer may each hold a reference;
 * the fence is freed when the last one drops, so a waiter woken by `signal`
 * can still inspect it after the holder has moved on.
 *
 * # Callbacks
 *
 * Callbacks registered with [`Fence::add_callback`] run on the signalling
 * thread after the fence lock is released.
 */

use crate::buffer::AccessMode;
use crate::core::id::next_fence_id;
use crate::core::types::{ContextId, FenceId};
use crate::monitoring::stats::{LiveToken, LiveTracker};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Callback run once when a fence signals
pub type FenceCallback = Box<dyn FnOnce(&Fence) + Send + 'static>;

/// Fence lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FenceStatus {
    /// Created, not yet installed
    Pending,
    /// Installed into a reservation, access granted
    Armed,
    /// Access released
    Signaled,
}

struct FenceState {
    status: FenceStatus,
    callbacks: Vec<FenceCallback>,
}

pub struct Fence {
    id: FenceId,
    context: ContextId,
    mode: AccessMode,
    state: Mutex<FenceState>,
    cond: Condvar,
    // Lock-free fast path for is_signaled
    signaled: AtomicBool,
    waiters: AtomicUsize,
    _live: LiveToken,
}

impl Fence {
    pub fn new(context: ContextId, mode: AccessMode, tracker: &LiveTracker) -> Self {
        Self {
            id: next_fence_id(),
            context,
            mode,
            state: Mutex::new(FenceState {
                status: FenceStatus::Pending,
                callbacks: Vec::new(),
            }),
            cond: Condvar::new(),
            signaled: AtomicBool::new(false),
            waiters: AtomicUsize::new(0),
            _live: tracker.acquire(),
        }
    }

    #[inline]
    pub fn id(&self) -> FenceId {
        self.id
    }

    /// Execution context that owns the grant
    #[inline]
    pub fn context(&self) -> ContextId {
        self.context
    }

    #[inline]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    pub fn status(&self) -> FenceStatus {
        self.state.lock().status
    }

    /// Number of threads currently blocked in [`Fence::wait_timeout`]
    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Enable signalling for an installed grant
    ///
    /// Returns `false` if the fence was already signalled.
    pub fn arm(&self) -> bool {
        let mut state = self.state.lock();
        match state.status {
            FenceStatus::Pending => {
                state.status = FenceStatus::Armed;
                true
            }
            FenceStatus::Armed => true,
            FenceStatus::Signaled => false,
        }
    }

    /// Register a callback to run when the fence signals
    ///
    /// Hands the callback back if the fence has already signalled.
    pub fn add_callback(&self, callback: FenceCallback) -> Result<(), FenceCallback> {
        let mut state = self.state.lock();
        if state.status == FenceStatus::Signaled {
            return Err(callback);
        }
        state.callbacks.push(callback);
        Ok(())
    }

    /// Mark the fence signalled, wake all waiters and run callbacks
    ///
    /// Returns `true` if this call performed the transition.
    pub fn signal(&self) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            if state.status == FenceStatus::Signaled {
                return false;
            }
            state.status = FenceStatus::Signaled;
            self.signaled.store(true, Ordering::Release);
            self.cond.notify_all();
            std::mem::take(&mut state.callbacks)
        };

        for callback in callbacks {
            callback(self);
        }
        true
    }

    /// Block until signalled or the timeout expires
    ///
    /// Returns `true` if the fence is signalled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until_signaled(timeout, || false)
    }

    /// Like [`Fence::wait_timeout`], but also returns once `interrupt` signals
    ///
    /// Returns `true` only if this fence is signalled. An already signalled
    /// `interrupt` returns `false` without blocking.
    pub fn wait_interruptible(self: &Arc<Self>, timeout: Duration, interrupt: &Fence) -> bool {
        if self.is_signaled() {
            return true;
        }

        let blocker: Weak<Fence> = Arc::downgrade(self);
        let wake: FenceCallback = Box::new(move |_| {
            if let Some(blocker) = blocker.upgrade() {
                blocker.wake();
            }
        });
        if interrupt.add_callback(wake).is_err() {
            return false;
        }

        self.wait_until_signaled(timeout, || interrupt.is_signaled())
    }

    /// Wake blocked waiters without signalling so they re-check their exit condition
    fn wake(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    fn wait_until_signaled(&self, timeout: Duration, interrupted: impl Fn() -> bool) -> bool {
        if self.is_signaled() {
            return true;
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        self.waiters.fetch_add(1, Ordering::Relaxed);

        while state.status != FenceStatus::Signaled && !interrupted() {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }

        self.waiters.fetch_sub(1, Ordering::Relaxed);
        state.status == FenceStatus::Signaled
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("mode", &self.mode)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
