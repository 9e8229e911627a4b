/*!
 * Monitoring
 * Structured tracing and synchronization statistics
 */

pub mod stats;
mod tracer;

pub use stats::{LiveTracker, SyncStats};
pub use tracer::{generate_trace_id, init_tracing, WaitSpan};
