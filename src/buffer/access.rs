/*!
 * Access Modes
 * Requested access bitsets and the recorded last-access domain
 */

use crate::core::errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Requested access to a buffer
    ///
    /// `DMA` qualifies `READ`/`WRITE` as a device-side access; on its own it
    /// is malformed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const DMA = 1 << 2;

        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
        const DMA_READ = Self::DMA.bits() | Self::READ.bits();
        const DMA_WRITE = Self::DMA.bits() | Self::WRITE.bits();
        const DMA_READ_WRITE = Self::DMA.bits() | Self::READ_WRITE.bits();
    }
}

impl AccessMode {
    /// Parse and normalize a raw access bitset
    pub fn from_raw(bits: u32) -> SyncResult<Self> {
        Self::from_bits(bits)
            .ok_or(SyncError::InvalidAccessMode(bits))?
            .normalize()
    }

    /// Validate this mode and reduce it to its effective form
    ///
    /// Write implies exclusivity, so `READ|WRITE` collapses to `WRITE`.
    pub fn normalize(self) -> SyncResult<Self> {
        if self.bits() & !Self::all().bits() != 0 || !self.intersects(Self::READ_WRITE) {
            return Err(SyncError::InvalidAccessMode(self.bits()));
        }

        if self.contains(Self::WRITE) {
            Ok(self - Self::READ)
        } else {
            Ok(self)
        }
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.contains(Self::WRITE)
    }

    #[inline]
    pub fn is_dma(&self) -> bool {
        self.contains(Self::DMA)
    }

    /// Access domain this mode records once granted
    pub fn access_type(&self) -> AccessType {
        match (self.is_dma(), self.is_write()) {
            (false, false) => AccessType::Read,
            (false, true) => AccessType::Write,
            (true, false) => AccessType::DmaRead,
            (true, true) => AccessType::DmaWrite,
        }
    }
}

/// Last access domain recorded on a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    #[default]
    None,
    Read,
    Write,
    DmaRead,
    DmaWrite,
}

impl AccessType {
    #[inline]
    pub fn is_dma(&self) -> bool {
        matches!(self, AccessType::DmaRead | AccessType::DmaWrite)
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        matches!(self, AccessType::Write | AccessType::DmaWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_write_absorbs_read() {
        assert_eq!(AccessMode::READ_WRITE.normalize().unwrap(), AccessMode::WRITE);
        assert_eq!(
            AccessMode::DMA_READ_WRITE.normalize().unwrap(),
            AccessMode::DMA_WRITE
        );
        assert_eq!(AccessMode::READ.normalize().unwrap(), AccessMode::READ);
    }

    #[test]
    fn test_malformed_modes_rejected() {
        assert_eq!(
            AccessMode::empty().normalize(),
            Err(SyncError::InvalidAccessMode(0))
        );
        assert_eq!(
            AccessMode::DMA.normalize(),
            Err(SyncError::InvalidAccessMode(0x4))
        );
        assert_eq!(
            AccessMode::from_raw(0x8),
            Err(SyncError::InvalidAccessMode(0x8))
        );
        assert!(AccessMode::from_bits_retain(0x10 | 0x1).normalize().is_err());
    }

    #[test]
    fn test_access_type_mapping() {
        assert_eq!(AccessMode::READ.access_type(), AccessType::Read);
        assert_eq!(AccessMode::WRITE.access_type(), AccessType::Write);
        assert_eq!(AccessMode::DMA_READ.access_type(), AccessType::DmaRead);
        assert_eq!(AccessMode::DMA_WRITE.access_type(), AccessType::DmaWrite);
        assert!(AccessType::DmaWrite.is_dma() && AccessType::DmaWrite.is_write());
        assert!(!AccessType::None.is_write());
    }

    proptest! {
        #[test]
        fn prop_normalized_mode_is_valid_and_stable(bits in 0u32..64) {
            match AccessMode::from_raw(bits) {
                Ok(mode) => {
                    prop_assert!(mode.intersects(AccessMode::READ_WRITE));
                    prop_assert!(!(mode.contains(AccessMode::READ) && mode.is_write()));
                    prop_assert_eq!(mode.normalize(), Ok(mode));
                }
                Err(err) => prop_assert_eq!(err, SyncError::InvalidAccessMode(bits)),
            }
        }
    }
}
