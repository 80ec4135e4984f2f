use std::io;
use thiserror::Error;

/// Status code for data that is not RNC packed (or could not be unpacked)
pub const NOT_PACKED: i32 = 0;
/// Status code for a packed payload whose CRC does not match the header
pub const PACKED_CRC: i32 = -1;
/// Status code for unpacked output whose CRC does not match the header
pub const UNPACKED_CRC: i32 = -2;

/// Possible errors that arise from attempting to convert RNC packed data into its
/// unpacked form, or the other way around.
///
/// Game loaders usually only care whether the data was RNC at all, so every error
/// can be flattened into the classic integer status with [`code`](RncError::code).
#[derive(Error, Debug)]
pub enum RncError {
    #[error("input is not RNC packed data")]
    NotPacked,

    #[error("input holds {available} bytes, but {needed} are required")]
    Truncated { needed: usize, available: usize },

    #[error("packed data is corrupt: header crc {expected:#06x}, computed {found:#06x}")]
    PackedCrc { expected: u16, found: u16 },

    #[error("unpacked data is corrupt: header crc {expected:#06x}, computed {found:#06x}")]
    UnpackedCrc { expected: u16, found: u16 },

    #[error("malformed packed stream: {0}")]
    Malformed(&'static str),

    #[error("output buffer holds {available} bytes, but {needed} are required")]
    OutputTooSmall { needed: usize, available: usize },

    #[error("{0} bytes of input do not fit into a single RNC file")]
    TooLarge(usize),

    #[error("cannot allocate {0} bytes for the unpacked data")]
    Allocation(usize),

    #[error("unpacking in place would need {0} bytes of leeway, more than a header can store")]
    Leeway(usize),

    #[error("{0}")]
    Io(#[from] io::Error),
}

impl RncError {
    /// The `NOT_PACKED` / `PACKED_CRC` / `UNPACKED_CRC` status for this error.
    ///
    /// Only the two checksum failures have their own code; anything else means
    /// the input could not be treated as RNC data.
    pub fn code(&self) -> i32 {
        match self {
            Self::PackedCrc { .. } => PACKED_CRC,
            Self::UnpackedCrc { .. } => UNPACKED_CRC,
            _ => NOT_PACKED,
        }
    }
}
