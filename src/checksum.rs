//! Table driven CRC-16/ARC, used by RNC files to checksum both the packed and
//! unpacked data.

use crc::{Crc, CRC_16_ARC};

/// A CRC-16/ARC engine (reflected polynomial `0xA001`, zero initial value).
///
/// ```
/// # use rnc::Crc16;
/// assert_eq!(Crc16::new().checksum(b"123456789"), 0xBB3D);
/// ```
pub struct Crc16 {
    crc: Crc<u16>,
}

impl Crc16 {
    pub const POLY: u16 = 0xA001;

    pub const fn new() -> Self {
        Self {
            crc: Crc::<u16>::new(&CRC_16_ARC),
        }
    }

    /// Calculate the checksum over all of `data`
    #[inline]
    pub fn checksum(&self, data: &[u8]) -> u16 {
        self.crc.checksum(data)
    }
}

impl Clone for Crc16 {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc16 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Crc16 {{ poly: {:#06x} }}", Self::POLY)
    }
}
