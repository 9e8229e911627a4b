/*!
 * Sync Objects
 * One buffer plus the access requested on it within an execution context
 */

use super::queue::Ticket;
use crate::buffer::{AccessMode, Buffer};
use crate::core::id::next_object_id;
use crate::core::types::{ContextId, ObjectId};
use crate::fence::Fence;
use crate::monitoring::stats::LiveToken;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Position of an object in the ownership protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectPhase {
    /// Not waiting and not holding the buffer
    Unqueued,
    /// In the ordering queue, waiting for its turn and for conflicting fences
    Queued,
    /// Fence installed; the owner may access the buffer until it signals
    Granted,
}

pub(crate) struct ObjectState {
    pub mode: AccessMode,
    pub fence: Option<Arc<Fence>>,
    pub phase: ObjectPhase,
    pub ticket: Option<Ticket>,
}

pub(crate) struct SyncObject {
    id: ObjectId,
    owner: ContextId,
    buffer: Buffer,
    state: Mutex<ObjectState>,
    _live: LiveToken,
}

impl SyncObject {
    pub(crate) fn new(
        owner: ContextId,
        buffer: Buffer,
        mode: AccessMode,
        fence: Arc<Fence>,
        live: LiveToken,
    ) -> Self {
        Self {
            id: next_object_id(),
            owner,
            buffer,
            state: Mutex::new(ObjectState {
                mode,
                fence: Some(fence),
                phase: ObjectPhase::Unqueued,
                ticket: None,
            }),
            _live: live,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub(crate) fn owner(&self) -> ContextId {
        self.owner
    }

    #[inline]
    pub(crate) fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    #[inline]
    pub(crate) fn state(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock()
    }

    pub(crate) fn phase(&self) -> ObjectPhase {
        self.state.lock().phase
    }
}

impl std::fmt::Debug for SyncObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SyncObject")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("buffer", &self.buffer.id())
            .field("mode", &state.mode)
            .field("phase", &state.phase)
            .finish()
    }
}
