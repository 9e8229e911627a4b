/*!
 * Buffer Synchronization
 *
 * Execution contexts, the ownership protocol and the process-wide manager.
 *
 * # Lock order
 *
 * context objects → object state → ordering queue / reservation → fence.
 * No lock is held while blocking on the queue or on a fence.
 */

mod api;
mod config;
mod context;
mod manager;
mod object;
mod queue;
mod reclaim;
mod signal;
mod wait;

pub use api::{
    add_buffer, create_context, destroy_context, global, init, is_initialized, release_all,
    release_buffer, shutdown, signal_all, signal_one, wait_all, wait_one,
};
pub use config::SyncConfig;
pub use context::SyncContext;
pub use manager::{current_thread_context, SyncManager, SyncManagerBuilder};
pub use object::ObjectPhase;
