/*!
 * Synchronization Manager
 *
 * Owns the process-wide state shared by every execution context: the
 * ordering queue, the cache-maintenance hook, the deferred reclaim timer and
 * the single-object table used by `wait_one`/`signal_one`.
 *
 * # Single objects
 *
 * `wait_one` and `signal_one` have no context handle. The calling thread is
 * the execution context: each thread gets a stable [`ContextId`] on first
 * use, and single objects are keyed by (thread context, buffer).
 */

use super::config::SyncConfig;
use super::context::SyncContext;
use super::object::SyncObject;
use super::queue::OrderingQueue;
use super::reclaim::DeferredReclaim;
use super::wait::Deadline;
use crate::buffer::{AccessMode, Buffer, CacheMaintenance, NoopCache, WeakBuffer};
use crate::core::errors::{SyncError, SyncResult};
use crate::core::id::next_context_id;
use crate::core::types::{BufferId, ContextId};
use crate::fence::Fence;
use crate::monitoring::stats::{LiveTracker, SyncCounters, SyncStats};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

thread_local! {
    static THREAD_CONTEXT: ContextId = next_context_id();
}

/// Execution context of the calling thread for single-object operations
pub fn current_thread_context() -> ContextId {
    THREAD_CONTEXT.with(|id| *id)
}

/// State shared by the manager and every context it created
pub(crate) struct SyncCore {
    pub(crate) config: SyncConfig,
    pub(crate) queue: OrderingQueue,
    pub(crate) cache: Arc<dyn CacheMaintenance>,
    pub(crate) reclaim: Option<DeferredReclaim>,
    pub(crate) fences: LiveTracker,
    pub(crate) objects: LiveTracker,
    pub(crate) contexts: LiveTracker,
    pub(crate) counters: SyncCounters,
    singles: DashMap<(ContextId, BufferId), Arc<SyncObject>, RandomState>,
    pub(crate) last_released: Mutex<Option<WeakBuffer>>,
}

impl SyncCore {
    pub(crate) fn new_fence(&self, owner: ContextId, mode: AccessMode) -> Arc<Fence> {
        Arc::new(Fence::new(owner, mode, &self.fences))
    }

    pub(crate) fn new_object(
        &self,
        owner: ContextId,
        buffer: &Buffer,
        mode: AccessMode,
    ) -> Arc<SyncObject> {
        Arc::new(SyncObject::new(
            owner,
            buffer.clone(),
            mode,
            self.new_fence(owner, mode),
            self.objects.acquire(),
        ))
    }

    fn stats(&self) -> SyncStats {
        let load = |c: &std::sync::atomic::AtomicU64| c.load(Ordering::Relaxed);
        SyncStats {
            live_fences: self.fences.live(),
            live_objects: self.objects.live(),
            live_contexts: self.contexts.live(),
            queued_waits: self.queue.len(),
            pending_reclaims: self.reclaim.as_ref().map_or(0, |r| r.pending_buffers()),
            single_objects: self.singles.len(),
            grants: load(&self.counters.grants),
            timeouts: load(&self.counters.timeouts),
            aborts: load(&self.counters.aborts),
            signals: load(&self.counters.signals),
            forced_releases: load(&self.counters.forced_releases),
        }
    }
}

/// Builder for [`SyncManager`]
pub struct SyncManagerBuilder {
    config: SyncConfig,
    cache: Arc<dyn CacheMaintenance>,
}

impl Default for SyncManagerBuilder {
    fn default() -> Self {
        Self {
            config: SyncConfig::default(),
            cache: Arc::new(NoopCache),
        }
    }
}

impl SyncManagerBuilder {
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Cache-maintenance hook invoked on CPU/DMA domain crossings
    pub fn with_cache(mut self, cache: Arc<dyn CacheMaintenance>) -> Self {
        self.cache = cache;
        self
    }

    pub fn build(self) -> SyncResult<SyncManager> {
        self.config.validate()?;

        let reclaim = self
            .config
            .deferred_reclaim
            .then(|| DeferredReclaim::start(self.config.reclaim_delay));

        info!(
            wait_timeout_ms = self.config.wait_timeout.as_millis() as u64,
            reclaim_delay_ms = self.config.reclaim_delay.as_millis() as u64,
            deferred_reclaim = self.config.deferred_reclaim,
            "Buffer sync manager started"
        );

        Ok(SyncManager {
            core: Arc::new(SyncCore {
                config: self.config,
                queue: OrderingQueue::new(),
                cache: self.cache,
                reclaim,
                fences: LiveTracker::new(),
                objects: LiveTracker::new(),
                contexts: LiveTracker::new(),
                counters: SyncCounters::default(),
                singles: DashMap::with_hasher(RandomState::new()),
                last_released: Mutex::new(None),
            }),
        })
    }
}

/// Handle to the synchronization subsystem
///
/// Cloning shares the same queue and bookkeeping.
#[derive(Clone)]
pub struct SyncManager {
    core: Arc<SyncCore>,
}

impl SyncManager {
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        Self::builder().with_config(config).build()
    }

    pub fn builder() -> SyncManagerBuilder {
        SyncManagerBuilder::default()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.core.config
    }

    /// Create an empty execution context
    pub fn create_context(&self, name: &str) -> SyncContext {
        SyncContext::new(name, Arc::clone(&self.core))
    }

    /// Acquire `buffer` for the calling thread without a context
    pub fn wait_one(&self, buffer: &Buffer, mode: AccessMode) -> SyncResult<Duration> {
        self.wait_one_timeout(buffer, mode, self.core.config.wait_timeout)
    }

    pub fn wait_one_timeout(
        &self,
        buffer: &Buffer,
        mode: AccessMode,
        timeout: Duration,
    ) -> SyncResult<Duration> {
        let mode = mode.normalize()?;
        let owner = current_thread_context();

        let object = match self.core.singles.entry((owner, buffer.id())) {
            Entry::Occupied(_) => return Err(SyncError::Busy(buffer.id())),
            Entry::Vacant(slot) => {
                let object = self.core.new_object(owner, buffer, mode);
                slot.insert(Arc::clone(&object));
                object
            }
        };

        let result = self.core.acquire(&object, &Deadline::new(timeout));
        if result.is_err() {
            self.core.singles.remove(&(owner, buffer.id()));
        }
        result
    }

    /// Release the calling thread's single-object grant on `buffer`
    ///
    /// Fails with [`SyncError::NotHeld`] and changes nothing if the thread
    /// holds no single object for the buffer.
    pub fn signal_one(&self, buffer: &Buffer) -> SyncResult<()> {
        let owner = current_thread_context();
        let (_, object) = self
            .core
            .singles
            .remove(&(owner, buffer.id()))
            .ok_or(SyncError::NotHeld(buffer.id()))?;
        self.core.release_object(&object);
        Ok(())
    }

    /// True if the calling thread holds a single object on `buffer`
    pub fn holds(&self, buffer: &Buffer) -> bool {
        self.core
            .singles
            .contains_key(&(current_thread_context(), buffer.id()))
    }

    pub fn stats(&self) -> SyncStats {
        self.core.stats()
    }

    /// Buffer most recently released by a signal, if it is still alive
    pub fn last_released(&self) -> Option<BufferId> {
        self.core
            .last_released
            .lock()
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .map(|buffer| buffer.id())
    }

    /// Drop every fence reference held by the reclaim timer now
    pub fn flush_reclaim(&self) -> usize {
        self.core.reclaim.as_ref().map_or(0, |r| r.flush())
    }

    /// Force-release outstanding single objects and stop the reclaim timer
    pub fn shutdown(&self) -> SyncStats {
        let keys: Vec<(ContextId, BufferId)> =
            self.core.singles.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            if let Some((_, object)) = self.core.singles.remove(&key) {
                self.core.force_release(&object);
            }
        }

        if let Some(reclaim) = &self.core.reclaim {
            reclaim.shutdown();
        }

        let stats = self.core.stats();
        debug!(?stats, "Buffer sync manager stopped");
        stats
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("config", &self.core.config)
            .field("queued", &self.core.queue.len())
            .field("singles", &self.core.singles.len())
            .finish()
    }
}
