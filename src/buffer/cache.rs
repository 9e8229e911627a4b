/*!
 * Cache Coherency Hook
 *
 * Decides which cache-maintenance operation an ownership change needs and
 * forwards it to the external maintenance primitive.
 *
 * | previous access | new access | operation                         |
 * |-----------------|------------|-----------------------------------|
 * | DMA write       | CPU read   | flush: `begin_cpu_access(FromDevice)` |
 * | CPU write       | DMA read   | invalidate: `end_cpu_access(ToDevice)` |
 * | anything else   |            | none                              |
 */

use super::access::AccessType;
use super::Buffer;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Transfer direction handed to the maintenance primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDirection {
    ToDevice,
    FromDevice,
    Bidirectional,
}

/// External cache-maintenance primitive
///
/// Implementations must be thread-safe; calls are made while the granting
/// thread holds the object's state lock, so they must not call back into the
/// synchronization manager.
#[cfg_attr(test, mockall::automock)]
pub trait CacheMaintenance: Send + Sync {
    /// Make device writes visible to the CPU
    fn begin_cpu_access(&self, buffer: &Buffer, direction: DataDirection);

    /// Make CPU writes visible to the device
    fn end_cpu_access(&self, buffer: &Buffer, direction: DataDirection);
}

/// Maintenance that does nothing (coherent memory, tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl CacheMaintenance for NoopCache {
    fn begin_cpu_access(&self, _buffer: &Buffer, _direction: DataDirection) {}

    fn end_cpu_access(&self, _buffer: &Buffer, _direction: DataDirection) {}
}

/// Cache operation required by a domain crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOp {
    None,
    Flush,
    Invalidate,
}

impl CacheOp {
    /// Operation needed when `next` follows `previous` on the same buffer
    pub fn for_transition(previous: AccessType, next: AccessType) -> Self {
        match (previous, next) {
            (AccessType::DmaWrite, AccessType::Read) => CacheOp::Flush,
            (AccessType::Write, AccessType::DmaRead) => CacheOp::Invalidate,
            _ => CacheOp::None,
        }
    }

    /// Forward this operation to the maintenance primitive
    pub fn apply(self, cache: &dyn CacheMaintenance, buffer: &Buffer) {
        match self {
            CacheOp::None => {}
            CacheOp::Flush => {
                trace!(buffer = %buffer.id(), "cache flush before CPU read");
                cache.begin_cpu_access(buffer, DataDirection::FromDevice);
            }
            CacheOp::Invalidate => {
                trace!(buffer = %buffer.id(), "cache invalidate before DMA read");
                cache.end_cpu_access(buffer, DataDirection::ToDevice);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_transition_table() {
        assert_eq!(
            CacheOp::for_transition(AccessType::DmaWrite, AccessType::Read),
            CacheOp::Flush
        );
        assert_eq!(
            CacheOp::for_transition(AccessType::Write, AccessType::DmaRead),
            CacheOp::Invalidate
        );
        assert_eq!(
            CacheOp::for_transition(AccessType::Read, AccessType::Read),
            CacheOp::None
        );
        assert_eq!(
            CacheOp::for_transition(AccessType::DmaWrite, AccessType::DmaRead),
            CacheOp::None
        );
        assert_eq!(
            CacheOp::for_transition(AccessType::None, AccessType::Write),
            CacheOp::None
        );
    }

    #[test]
    fn test_flush_calls_begin_cpu_access() {
        let buffer = Buffer::new("scanout", 4096);
        let mut cache = MockCacheMaintenance::new();
        cache
            .expect_begin_cpu_access()
            .withf(|_, dir| *dir == DataDirection::FromDevice)
            .times(1)
            .return_const(());
        cache.expect_end_cpu_access().times(0);

        CacheOp::Flush.apply(&cache, &buffer);
    }

    #[test]
    fn test_invalidate_calls_end_cpu_access() {
        let buffer = Buffer::new("texture", 4096);
        let mut cache = MockCacheMaintenance::new();
        cache.expect_begin_cpu_access().times(0);
        cache
            .expect_end_cpu_access()
            .with(mockall::predicate::always(), eq(DataDirection::ToDevice))
            .times(1)
            .return_const(());

        CacheOp::Invalidate.apply(&cache, &buffer);
    }

    #[test]
    fn test_none_is_silent() {
        let buffer = Buffer::new("idle", 64);
        let mut cache = MockCacheMaintenance::new();
        cache.expect_begin_cpu_access().times(0);
        cache.expect_end_cpu_access().times(0);

        CacheOp::None.apply(&cache, &buffer);
    }
}
