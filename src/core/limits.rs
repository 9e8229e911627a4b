/*!
 * System Limits and Constants
 *
 * Centralized location for synchronization timeouts, capacities and thresholds.
 *
 * Timing values are derived from a 60Hz display frame budget.
 * Capacity hints are marked with [PERF].
 */

use std::time::Duration;

// =============================================================================
// WAIT LIMITS
// =============================================================================

/// Default bound on a single ownership-acquisition wait (5s)
/// Long enough to cover several hundred display frames of legitimate
/// contention; short enough that a holder that never signals shows up as a
/// repeated warning instead of a frozen pipeline.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Largest accepted wait timeout (60s)
/// Anything longer is indistinguishable from a hang for a display pipeline.
pub const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Waits longer than one 60Hz frame (16ms) are logged as slow
pub const SLOW_WAIT_THRESHOLD: Duration = Duration::from_millis(16);

// =============================================================================
// RECLAIM LIMITS
// =============================================================================

/// Default delay before a superseded reader fence is dropped (500ms)
/// Roughly thirty frames: the reservation's lazily-pruned shared list has
/// long settled by then.
pub const DEFAULT_RECLAIM_DELAY: Duration = Duration::from_millis(500);

/// Largest accepted reclaim delay (10s)
pub const MAX_RECLAIM_DELAY: Duration = Duration::from_secs(10);

// =============================================================================
// RESERVATION CAPACITY
// =============================================================================

/// Initial shared-fence slots per reservation
/// [PERF] Most buffers see at most a scanout reader and one or two DMA readers
pub const SHARED_FENCE_INITIAL_CAPACITY: usize = 4;

/// Initial object slots per context
/// [PERF] A typical operation touches a source and a destination buffer
pub const CONTEXT_INITIAL_CAPACITY: usize = 2;

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Overrides the wait timeout, in milliseconds
pub const ENV_WAIT_TIMEOUT_MS: &str = "BUFSYNC_WAIT_TIMEOUT_MS";

/// Overrides the reclaim delay, in milliseconds
pub const ENV_RECLAIM_DELAY_MS: &str = "BUFSYNC_RECLAIM_DELAY_MS";

/// Enables or disables deferred reclaim (`0`/`1`/`true`/`false`)
pub const ENV_DEFERRED_RECLAIM: &str = "BUFSYNC_DEFERRED_RECLAIM";

/// Switches tracing output to JSON
pub const ENV_TRACE_JSON: &str = "BUFSYNC_TRACE_JSON";
