/*!
 * Process-Wide Interface
 *
 * The synchronization manager singleton, started at subsystem init and torn
 * down at stop, plus free functions over it and over context handles.
 */

use super::config::SyncConfig;
use super::context::SyncContext;
use super::manager::SyncManager;
use crate::buffer::{AccessMode, Buffer};
use crate::core::errors::{SyncError, SyncResult};
use crate::monitoring::SyncStats;
use parking_lot::{const_rwlock, RwLock};
use std::time::Duration;
use tracing::info;

static GLOBAL: RwLock<Option<SyncManager>> = const_rwlock(None);

/// Start the process-wide manager
pub fn init(config: SyncConfig) -> SyncResult<SyncManager> {
    let mut global = GLOBAL.write();
    if global.is_some() {
        return Err(SyncError::AlreadyInitialized);
    }
    let manager = SyncManager::new(config)?;
    *global = Some(manager.clone());
    Ok(manager)
}

/// The process-wide manager
pub fn global() -> SyncResult<SyncManager> {
    GLOBAL.read().clone().ok_or(SyncError::NotInitialized)
}

pub fn is_initialized() -> bool {
    GLOBAL.read().is_some()
}

/// Stop the process-wide manager, returning its final statistics
///
/// Contexts created from it keep working until dropped.
pub fn shutdown() -> Option<SyncStats> {
    let manager = GLOBAL.write().take()?;
    let stats = manager.shutdown();
    info!(quiescent = stats.is_quiescent(), "Buffer sync subsystem stopped");
    Some(stats)
}

pub fn create_context(name: &str) -> SyncResult<SyncContext> {
    Ok(global()?.create_context(name))
}

pub fn add_buffer(ctx: &SyncContext, buffer: &Buffer, mode: AccessMode) -> SyncResult<()> {
    ctx.add(buffer, mode)
}

pub fn wait_all(ctx: &SyncContext) -> SyncResult<Duration> {
    ctx.wait_all()
}

pub fn wait_one(buffer: &Buffer, mode: AccessMode) -> SyncResult<Duration> {
    global()?.wait_one(buffer, mode)
}

pub fn signal_all(ctx: &SyncContext) -> SyncResult<()> {
    ctx.signal_all()
}

pub fn signal_one(buffer: &Buffer) -> SyncResult<()> {
    global()?.signal_one(buffer)
}

pub fn release_buffer(ctx: &SyncContext, buffer: &Buffer) {
    ctx.release(buffer);
}

pub fn release_all(ctx: &SyncContext) -> usize {
    ctx.release_all()
}

pub fn destroy_context(ctx: SyncContext) {
    ctx.fini();
}
