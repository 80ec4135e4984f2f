//! Unpack (and pack) Rob Northen Computing's ProPack "RNC" compressed data,
//! as found in many Amiga, DOS, and console games.
//!
//! ```
//! # use rnc::{EncoderBuilder, RncDecoder};
//! let original = b"RNC ProPack, RNC ProPack, RNC ProPack";
//! let packed = EncoderBuilder::for_bytes(original).encode_to_vec().unwrap();
//!
//! let mut unpacked = vec![0; original.len()];
//! RncDecoder::new().unpack(&packed, &mut unpacked).unwrap();
//! assert_eq!(&unpacked[..], &original[..]);
//! ```
//! See the [`format`] module for a description of the file format.

mod checksum;
mod decode;
mod encode;
mod errors;
pub mod format;

pub use checksum::Crc16;
pub use decode::{decode, decode_or_raw, rnc_info, Decoder, RncDecoder};
pub use encode::{encode, lzss::LzssSettings, EncoderBuilder, LzssBackend};
pub use errors::{RncError, NOT_PACKED, PACKED_CRC, UNPACKED_CRC};
pub use format::{RncHeader, RncMethod, HEADER_LEN};
