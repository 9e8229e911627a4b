/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::BufferId;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Buffer synchronization errors
///
/// Contention is never an error: a wait that runs out of time logs a warning
/// and proceeds as if granted.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SyncError {
    #[error("Invalid access mode: {0:#x}")]
    #[diagnostic(
        code(sync::invalid_access_mode),
        help("Use READ, WRITE or READ|WRITE, optionally combined with DMA.")
    )]
    InvalidAccessMode(u32),

    #[error("Out of memory: {0}")]
    #[diagnostic(
        code(sync::out_of_memory),
        help("Fence bookkeeping could not grow. Release idle buffers and retry.")
    )]
    OutOfMemory(String),

    #[error("Buffer {0} is already queued or held by this owner")]
    #[diagnostic(
        code(sync::busy),
        help("Signal the outstanding grant before requesting the buffer again.")
    )]
    Busy(BufferId),

    #[error("Buffer {0} is not held by the caller")]
    #[diagnostic(
        code(sync::not_held),
        help("Only the owner that waited on a buffer may signal it.")
    )]
    NotHeld(BufferId),

    #[error("Buffer {0} is not attached to this context")]
    #[diagnostic(code(sync::not_attached), help("Add the buffer to the context before waiting on it."))]
    NotAttached(BufferId),

    #[error("Wait on buffer {0} was aborted before it was granted")]
    #[diagnostic(
        code(sync::aborted),
        help("The object was signalled or released while its wait was still queued.")
    )]
    Aborted(BufferId),

    #[error("Synchronization manager is not initialized")]
    #[diagnostic(code(sync::not_initialized), help("Call sync::init() at subsystem start."))]
    NotInitialized,

    #[error("Synchronization manager is already initialized")]
    #[diagnostic(code(sync::already_initialized))]
    AlreadyInitialized,

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(sync::invalid_config),
        help("Invalid configuration. Review timeout and reclaim parameters.")
    )]
    InvalidConfig(String),
}

impl From<std::collections::TryReserveError> for SyncError {
    fn from(err: std::collections::TryReserveError) -> Self {
        SyncError::OutOfMemory(err.to_string())
    }
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;
