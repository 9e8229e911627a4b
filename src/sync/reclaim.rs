/*!
 * Deferred Fence Reclamation
 *
 * Holds an extra reference to freshly installed reader fences for a short
 * delay so a write request that immediately supersedes them never frees a
 * fence the reservation bookkeeping may still be looking at.
 *
 * # Coalescing
 *
 * There is at most one pending task per buffer holding one fence. Re-arming
 * a buffer replaces the held fence and pushes the deadline out; the prior
 * reference is dropped outside the task lock. On expiry the held reference
 * is dropped unconditionally.
 *
 * The task runs on one background thread per manager; nothing here is
 * required for correctness, it only bounds how long references linger.
 */

use crate::core::types::BufferId;
use crate::fence::Fence;
use ahash::RandomState;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

struct PendingReclaim {
    deadline: Instant,
    fence: Arc<Fence>,
}

struct ReclaimTasks {
    pending: HashMap<BufferId, PendingReclaim, RandomState>,
    shutdown: bool,
}

struct ReclaimState {
    tasks: Mutex<ReclaimTasks>,
    cond: Condvar,
}

pub(crate) struct DeferredReclaim {
    delay: Duration,
    state: Arc<ReclaimState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeferredReclaim {
    /// Start the reclaim thread
    ///
    /// If the thread cannot be spawned, references are released immediately
    /// on arm instead of after the delay.
    pub(crate) fn start(delay: Duration) -> Self {
        let state = Arc::new(ReclaimState {
            tasks: Mutex::new(ReclaimTasks {
                pending: HashMap::with_hasher(RandomState::new()),
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        let worker = {
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("bufsync-reclaim".into())
                .spawn(move || run(state))
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not start reclaim thread, releasing fences eagerly");
                None
            }
        };

        Self {
            delay,
            state,
            worker: Mutex::new(worker),
        }
    }

    /// Hold `fence` until `delay` after the most recent arm for `buffer`
    ///
    /// Cancels and replaces any task already pending for `buffer`.
    pub(crate) fn arm(&self, buffer: BufferId, fence: Arc<Fence>) {
        if self.worker.lock().is_none() {
            return;
        }

        let deadline = Instant::now() + self.delay;
        let replaced = {
            let mut tasks = self.state.tasks.lock();
            if tasks.shutdown {
                return;
            }
            let replaced = tasks
                .pending
                .insert(buffer, PendingReclaim { deadline, fence })
                .map(|prior| prior.fence);
            trace!(buffer = %buffer, coalesced = replaced.is_some(), "reclaim armed");
            self.state.cond.notify_one();
            replaced
        };
        drop(replaced);
    }

    /// Buffers with a pending task
    pub(crate) fn pending_buffers(&self) -> usize {
        self.state.tasks.lock().pending.len()
    }

    /// Fence references currently held
    #[cfg(test)]
    pub(crate) fn held_fences(&self) -> usize {
        self.state.tasks.lock().pending.len()
    }

    /// Drop every held reference now, returning how many were released
    pub(crate) fn flush(&self) -> usize {
        let drained: Vec<PendingReclaim> = {
            let mut tasks = self.state.tasks.lock();
            tasks.pending.drain().map(|(_, task)| task).collect()
        };
        drained.len()
    }

    /// Stop the reclaim thread and release everything it held
    pub(crate) fn shutdown(&self) {
        {
            let mut tasks = self.state.tasks.lock();
            tasks.shutdown = true;
            self.state.cond.notify_all();
        }
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                warn!("reclaim thread panicked");
            }
        }
        self.flush();
    }
}

impl Drop for DeferredReclaim {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(state: Arc<ReclaimState>) {
    let mut tasks = state.tasks.lock();
    loop {
        if tasks.shutdown {
            break;
        }

        let now = Instant::now();
        let due: Vec<BufferId> = tasks
            .pending
            .iter()
            .filter(|(_, task)| task.deadline <= now)
            .map(|(buffer, _)| *buffer)
            .collect();

        if !due.is_empty() {
            let expired: Vec<PendingReclaim> = due
                .iter()
                .filter_map(|buffer| tasks.pending.remove(buffer))
                .collect();
            trace!(buffers = due.len(), "reclaim expired");
            MutexGuard::unlocked(&mut tasks, || drop(expired));
            continue;
        }

        match tasks.pending.values().map(|t| t.deadline).min() {
            Some(next) => {
                state.cond.wait_until(&mut tasks, next);
            }
            None => state.cond.wait(&mut tasks),
        }
    }
}
