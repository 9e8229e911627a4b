/*!
 * Shared Buffers
 *
 * Opaque buffer handles owned by the external allocator. Each buffer carries
 * exactly one reservation, which the synchronization core reads and mutates.
 */

mod access;
mod cache;

pub use access::{AccessMode, AccessType};
pub use cache::{CacheMaintenance, CacheOp, DataDirection, NoopCache};

#[cfg(test)]
pub use cache::MockCacheMaintenance;

use crate::core::id::next_buffer_id;
use crate::core::types::BufferId;
use crate::reservation::Reservation;
use smartstring::alias::String as SmartString;
use std::fmt;
use std::sync::{Arc, Weak};

struct BufferInner {
    id: BufferId,
    name: SmartString,
    size: usize,
    reservation: Arc<Reservation>,
}

/// Strong buffer handle
///
/// Cloning is cheap; all clones refer to the same reservation.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    pub fn new(name: &str, size: usize) -> Self {
        let id = next_buffer_id();
        Self {
            inner: Arc::new(BufferInner {
                id,
                name: name.into(),
                size,
                reservation: Arc::new(Reservation::new(id)),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Reservation state tracking this buffer's fences
    #[inline]
    pub fn reservation(&self) -> &Arc<Reservation> {
        &self.inner.reservation
    }

    pub fn downgrade(&self) -> WeakBuffer {
        WeakBuffer {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles name the same buffer
    pub fn same_as(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name.as_str())
            .field("size", &self.inner.size)
            .finish()
    }
}

/// Weak buffer handle that does not keep the allocation alive
#[derive(Clone)]
pub struct WeakBuffer {
    id: BufferId,
    inner: Weak<BufferInner>,
}

impl WeakBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Buffer> {
        self.inner.upgrade().map(|inner| Buffer { inner })
    }
}

impl fmt::Debug for WeakBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBuffer").field("id", &self.id).finish()
    }
}
