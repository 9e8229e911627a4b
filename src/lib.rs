/*!
 * DMA Buffer Synchronization Library
 * Coordinates CPU and DMA-engine access to shared memory buffers
 */

pub mod buffer;
pub mod core;
pub mod fence;
pub mod monitoring;
pub mod reservation;
pub mod sync;

// Re-exports
pub use buffer::{
    AccessMode, AccessType, Buffer, CacheMaintenance, CacheOp, DataDirection, NoopCache,
    WeakBuffer,
};
pub use crate::core::errors::{SyncError, SyncResult};
pub use crate::core::types::{BufferId, ContextId, FenceId};
pub use fence::{Fence, FenceStatus};
pub use monitoring::{init_tracing, SyncStats};
pub use reservation::{FenceSet, Reservation};
pub use sync::{ObjectPhase, SyncConfig, SyncContext, SyncManager, SyncManagerBuilder};
