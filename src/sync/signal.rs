/*!
 * Ownership Release
 *
 * Signals an object's fence so blocked waiters wake, and withdraws any wait
 * that was still queued.
 */

use super::manager::SyncCore;
use super::object::{ObjectPhase, SyncObject};
use crate::monitoring::stats::SyncCounters;
use tracing::{debug, warn};

impl SyncCore {
    /// Release whatever `object` holds or is waiting for
    ///
    /// A queued wait is removed from the ordering queue and its waiter
    /// returns [`SyncError::Aborted`](crate::SyncError::Aborted). Returns
    /// `false` if the object was neither queued nor granted.
    pub(crate) fn release_object(&self, object: &SyncObject) -> bool {
        let buffer = object.buffer();
        {
            let mut state = object.state();
            if state.phase == ObjectPhase::Unqueued {
                return false;
            }

            if let Some(ticket) = state.ticket.take() {
                if self.queue.remove(ticket) {
                    SyncCounters::bump(&self.counters.aborts);
                    debug!(
                        object = %object.id(),
                        context = %object.owner(),
                        buffer = %buffer.id(),
                        "signalled before grant, wait aborted"
                    );
                }
            }

            state.phase = ObjectPhase::Unqueued;
            // Signalled under the object lock so a concurrent grant sees it
            if let Some(fence) = state.fence.take() {
                fence.signal();
            }
        }

        SyncCounters::bump(&self.counters.signals);
        *self.last_released.lock() = Some(buffer.downgrade());
        true
    }

    /// Release on behalf of an owner that did not signal
    pub(crate) fn force_release(&self, object: &SyncObject) {
        if self.release_object(object) {
            SyncCounters::bump(&self.counters.forced_releases);
            warn!(
                object = %object.id(),
                context = %object.owner(),
                buffer = %object.buffer().id(),
                "releasing grant that was never signalled"
            );
        }
    }
}
