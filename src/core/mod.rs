/*!
 * Core Module
 * Shared identifiers, limits, and error types
 */

pub mod errors;
pub mod id;
pub mod limits;
pub mod types;

pub use errors::{SyncError, SyncResult};
pub use types::{BufferId, ContextId, ContextName, FenceId, ObjectId};
