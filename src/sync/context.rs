/*!
 * Execution Contexts
 *
 * A context groups the buffers one logical operation touches. Buffers are
 * attached with an access mode, acquired together with `wait_all` and
 * released together with `signal_all`.
 *
 * # Teardown
 *
 * Dropping a context releases anything still attached, withdraws its queued
 * waits and runs the teardown callback. Objects left attached at drop time
 * are logged.
 */

use super::manager::SyncCore;
use super::object::{ObjectPhase, SyncObject};
use super::wait::Deadline;
use crate::buffer::{AccessMode, Buffer};
use crate::core::errors::{SyncError, SyncResult};
use crate::core::id::next_context_id;
use crate::core::limits::CONTEXT_INITIAL_CAPACITY;
use crate::core::types::{ContextId, ContextName};
use crate::monitoring::stats::LiveToken;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type TeardownCallback = Box<dyn FnOnce() + Send + 'static>;

pub struct SyncContext {
    id: ContextId,
    name: ContextName,
    core: Arc<SyncCore>,
    objects: Mutex<Vec<Arc<SyncObject>>>,
    teardown: Mutex<Option<TeardownCallback>>,
    _live: LiveToken,
}

impl SyncContext {
    pub(crate) fn new(name: &str, core: Arc<SyncCore>) -> Self {
        let id = next_context_id();
        debug!(context = %id, name, "context created");
        Self {
            id,
            name: name.into(),
            _live: core.contexts.acquire(),
            core,
            objects: Mutex::new(Vec::with_capacity(CONTEXT_INITIAL_CAPACITY)),
            teardown: Mutex::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    pub fn contains(&self, buffer: &Buffer) -> bool {
        self.find(buffer).is_some()
    }

    /// Protocol phase of the object attached for `buffer`
    pub fn phase(&self, buffer: &Buffer) -> Option<ObjectPhase> {
        self.find(buffer).map(|object| object.phase())
    }

    fn find(&self, buffer: &Buffer) -> Option<Arc<SyncObject>> {
        self.objects
            .lock()
            .iter()
            .find(|object| object.buffer().same_as(buffer))
            .cloned()
    }

    /// Attach `buffer` with the requested access
    ///
    /// `READ | WRITE` is stored as `WRITE`. Re-adding a buffer that is not
    /// queued or held replaces its mode and fence; re-adding one that is
    /// fails with [`SyncError::Busy`].
    pub fn add(&self, buffer: &Buffer, mode: AccessMode) -> SyncResult<()> {
        let mode = mode.normalize()?;
        let mut objects = self.objects.lock();

        if let Some(object) = objects.iter().find(|o| o.buffer().same_as(buffer)) {
            let mut state = object.state();
            if state.phase != ObjectPhase::Unqueued {
                return Err(SyncError::Busy(buffer.id()));
            }
            state.mode = mode;
            state.fence = Some(self.core.new_fence(self.id, mode));
            return Ok(());
        }

        objects.try_reserve(1)?;
        objects.push(self.core.new_object(self.id, buffer, mode));
        Ok(())
    }

    /// Acquire every attached buffer with the configured timeout
    pub fn wait_all(&self) -> SyncResult<Duration> {
        self.wait_all_timeout(self.core.config.wait_timeout)
    }

    /// Acquire every attached buffer under one shared deadline
    ///
    /// Buffers are acquired in buffer-id order. If any acquisition fails, the
    /// grants made by this call are released before the error is returned.
    pub fn wait_all_timeout(&self, timeout: Duration) -> SyncResult<Duration> {
        let mut objects: Vec<Arc<SyncObject>> = self.objects.lock().clone();
        let deadline = Deadline::new(timeout);

        if let [object] = objects.as_slice() {
            return self.core.acquire(object, &deadline);
        }
        objects.sort_by_key(|object| object.buffer().id());

        let mut acquired: Vec<&Arc<SyncObject>> = Vec::with_capacity(objects.len());
        for object in &objects {
            let held = object.phase() == ObjectPhase::Granted;
            match self.core.acquire(object, &deadline) {
                Ok(_) if !held => acquired.push(object),
                Ok(_) => {}
                Err(e) => {
                    for granted in acquired {
                        self.core.release_object(granted);
                    }
                    return Err(e);
                }
            }
        }
        Ok(deadline.remaining())
    }

    /// Acquire one attached buffer
    pub fn wait(&self, buffer: &Buffer) -> SyncResult<Duration> {
        self.wait_timeout(buffer, self.core.config.wait_timeout)
    }

    pub fn wait_timeout(&self, buffer: &Buffer, timeout: Duration) -> SyncResult<Duration> {
        let object = self
            .find(buffer)
            .ok_or(SyncError::NotAttached(buffer.id()))?;
        self.core.acquire(&object, &Deadline::new(timeout))
    }

    /// Release every grant held by this context
    ///
    /// Objects stay attached and can be waited on again.
    pub fn signal_all(&self) -> SyncResult<()> {
        let objects: Vec<Arc<SyncObject>> = self.objects.lock().clone();
        let released = objects
            .iter()
            .filter(|object| self.core.release_object(object))
            .count();
        debug!(context = %self.id, released, "context signalled");
        Ok(())
    }

    /// Release the grant on one buffer
    pub fn signal(&self, buffer: &Buffer) -> SyncResult<()> {
        let object = self.find(buffer).ok_or(SyncError::NotHeld(buffer.id()))?;
        if !self.core.release_object(&object) {
            return Err(SyncError::NotHeld(buffer.id()));
        }
        Ok(())
    }

    /// Detach `buffer`; no-op if it is not attached
    pub fn release(&self, buffer: &Buffer) {
        let removed = {
            let mut objects = self.objects.lock();
            objects
                .iter()
                .position(|object| object.buffer().same_as(buffer))
                .map(|pos| objects.remove(pos))
        };
        if let Some(object) = removed {
            self.core.force_release(&object);
        }
    }

    /// Detach every buffer, returning how many were attached
    pub fn release_all(&self) -> usize {
        let objects = std::mem::take(&mut *self.objects.lock());
        for object in &objects {
            self.core.force_release(object);
        }
        objects.len()
    }

    /// Register a callback run once when the context is torn down
    ///
    /// Replaces any previously registered callback.
    pub fn on_teardown<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.teardown.lock() = Some(Box::new(callback));
    }

    /// Tear the context down
    pub fn fini(self) {
        drop(self);
    }
}

impl Drop for SyncContext {
    fn drop(&mut self) {
        let attached = self.objects.get_mut().len();
        if attached > 0 {
            warn!(
                context = %self.id,
                name = %self.name,
                objects = attached,
                "context torn down with buffers attached"
            );
            self.release_all();
        }

        let purged = self.core.queue.purge_owner(self.id);
        if purged > 0 {
            warn!(context = %self.id, purged, "dropped queued waits of destroyed context");
        }

        if let Some(callback) = self.teardown.get_mut().take() {
            callback();
        }
        debug!(context = %self.id, "context destroyed");
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("objects", &self.len())
            .finish()
    }
}
