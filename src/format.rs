//! Information and structures for RNC ProPack files.
//!
//! ## Header
//! Every RNC file starts with an eighteen byte, big endian header:
//!
//! | Byte Num | Description |
//! | :------: | ----------- |
//! | 0..4     | magic bytes (`"RNC\x01"` for method 1, `"RNC\x02"` for method 2) |
//! | 4..8     | size of the unpacked data |
//! | 8..12    | size of the packed data, not including the header |
//! | 12..14   | CRC-16 of the unpacked data |
//! | 14..16   | CRC-16 of the packed data |
//! | 16       | leeway: extra output space needed to unpack in place |
//! | 17       | number of packed blocks |
//!
//! The packed data starts right after the header, at byte 18.
//! The key data can be extracted into an [`RncHeader`] by using [`rnc_info()`].
//!
//! ## Method 1
//! Method 1 data is a little endian bitstream read sixteen bits at a time, with
//! uncoded "literal" bytes stored directly in between the bitstream words.
//! The first two bits are flags, and are ignored. Then, for each block:
//! 1. three Huffman tables: literal run lengths, match distances, and match lengths
//! 2. a sixteen bit count of (literal run, match) pairs
//! 3. the pairs. The last pair of a block only has a literal run.
//!
//! A Huffman table is a five bit symbol count, followed by a four bit code length
//! for each symbol. A length of zero means that the symbol is unused.
//! Codes are assigned canonically: shortest codes first, then by symbol number.
//!
//! The decoded symbols are not the values themselves, but "buckets":
//! symbols `0` and `1` are literally `0` and `1`, while any larger symbol `s` is
//! followed by `s - 1` extra bits that fill in a value from `2^(s-1)` to `2^s - 1`.
//! For example, symbol `4` followed by the extra bits `101` is the value `0b1101` (13).
//!
//! ## Method 2
//! Method 2 has no Huffman tables. Flag bits are read most significant bit first,
//! one byte at a time, and are interleaved with literal bytes, match offsets,
//! and long match lengths. See [`RncDecoder::unpack_m2`] for the exact grammar.
//!
//! [`rnc_info()`]: crate::rnc_info
//! [`RncDecoder::unpack_m2`]: crate::RncDecoder::unpack_m2

use crate::decode::bits::BitWindow;
use crate::errors::RncError;
use bitstream_io::{BigEndian, BitReader, BitWriter, BE};
use smallvec::SmallVec;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::ops::Range;

/// Length of the header at the start of every RNC file
pub const HEADER_LEN: usize = 18;
/// Shortest match that can be encoded in a method 1 stream
pub(crate) const MIN_LENGTH: usize = 2;
/// Most symbols one method 1 Huffman table can describe
pub(crate) const MAX_CODES: usize = 16;

/// The two kinds of RNC ProPack compression.
///
/// `M1` is the original Huffman coded scheme, while `M2` trades
/// compression ratio for a simpler bit coding.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RncMethod {
    M1 = 1,
    M2 = 2,
}

impl RncMethod {
    pub const fn signature(self) -> u32 {
        0x524E_4300 | self as u32
    }

    pub fn from_signature(sig: u32) -> Option<Self> {
        match sig {
            0x524E_4301 => Some(Self::M1),
            0x524E_4302 => Some(Self::M2),
            _ => None,
        }
    }
}

impl fmt::Display for RncMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::M1 => write!(f, "Method 1 (Huffman)"),
            Self::M2 => write!(f, "Method 2 (Bit Coded)"),
        }
    }
}

/// The information stored at the start of an RNC file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RncHeader {
    pub method: RncMethod,
    /// size of unpacked data
    pub unpacked_len: u32,
    /// size of packed data following the header
    pub packed_len: u32,
    pub unpacked_crc: u16,
    pub packed_crc: u16,
    /// extra bytes past the unpacked data that in place unpacking may use
    pub leeway: u8,
    /// number of method 1 blocks
    pub blocks: u8,
}

impl RncHeader {
    /// Parse the header at the start of `bytes`.
    ///
    /// Only the four magic bytes are looked at until they are known to be valid,
    /// so anything that isn't RNC data is rejected as [`RncError::NotPacked`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RncError> {
        let magic = bytes.get(..4).ok_or(RncError::NotPacked)?;
        let sig = u32::from_be_bytes([magic[0], magic[1], magic[2], magic[3]]);
        RncMethod::from_signature(sig).ok_or(RncError::NotPacked)?;

        if bytes.len() < HEADER_LEN {
            return Err(RncError::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        Self::from_bitreader(&mut BitReader::endian(Cursor::new(bytes), BigEndian))
    }

    /// Convenience function to read the RNC header from a bitstream
    pub(crate) fn from_bitreader<R: Read>(reader: &mut BitReader<R, BE>) -> Result<Self, RncError> {
        let sig: u32 = reader.read(32)?;
        let method = RncMethod::from_signature(sig).ok_or(RncError::NotPacked)?;

        Ok(Self {
            method,
            unpacked_len: reader.read(32)?,
            packed_len: reader.read(32)?,
            unpacked_crc: reader.read(16)?,
            packed_crc: reader.read(16)?,
            leeway: reader.read(8)?,
            blocks: reader.read(8)?,
        })
    }

    /// Write out `self` to the big endian `BitWriter` to match the RNC format
    pub(crate) fn write<W: Write>(&self, wtr: &mut BitWriter<W, BE>) -> Result<(), RncError> {
        wtr.write(32, self.method.signature())?; // 0..4
        wtr.write(32, self.unpacked_len)?; // 4..8
        wtr.write(32, self.packed_len)?; // 8..12
        wtr.write(16, self.unpacked_crc)?; // 12..14
        wtr.write(16, self.packed_crc)?; // 14..16
        wtr.write(8, self.leeway)?; // 16
        wtr.write(8, self.blocks)?; // 17

        Ok(())
    }

    /// Position of the packed data in a buffer that starts with this header
    pub fn packed_range(&self) -> Range<usize> {
        HEADER_LEN..HEADER_LEN + self.packed_len as usize
    }

    /// Bytes needed to unpack this data in place: the unpacked size plus the leeway
    pub fn required_output_len(&self) -> usize {
        self.unpacked_len as usize + self.leeway as usize
    }
}

/// One canonical Huffman code in a method 1 table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct HuffEntry {
    /// selects the low `bit_len` bits of the window
    pub mask: u16,
    /// bit reversed code, as it appears in the least significant bit first stream
    pub code: u16,
    pub bit_len: u8,
    pub symbol: u8,
}

/// A method 1 Huffman table, stored in canonical order and searched linearly.
///
/// Tables only ever hold sixteen symbols, so a linear search over the
/// `(mask, code)` pairs is as fast as a lookup tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct HuffTable {
    entries: SmallVec<[HuffEntry; MAX_CODES]>,
}

impl HuffTable {
    /// Assign canonical codes for the per-symbol bit `lengths`.
    /// Zero length symbols are not part of the table.
    pub(crate) fn from_lengths(lengths: &[u8]) -> Self {
        let mut entries = SmallVec::new();
        let mut huff_code: u16 = 0;

        for bit_len in 1..=16u8 {
            for (symbol, _) in lengths.iter().enumerate().filter(|(_, &l)| l == bit_len) {
                let mask = ((1u32 << bit_len) - 1) as u16;
                let prefix = (huff_code as u32 >> (16 - bit_len)) as u16;
                let code = prefix.reverse_bits() >> (16 - bit_len);

                entries.push(HuffEntry {
                    mask,
                    code,
                    bit_len,
                    symbol: symbol as u8,
                });
                huff_code = huff_code.wrapping_add((1u32 << (16 - bit_len)) as u16);
            }
        }

        Self { entries }
    }

    /// Read a table description from a method 1 bitstream.
    ///
    /// A symbol count of zero gives an empty table, which means that
    /// the block never uses this table.
    pub(crate) fn from_window(bits: &mut BitWindow) -> Result<Self, RncError> {
        let num_codes = bits.input_bits(5) as usize;
        if num_codes > MAX_CODES {
            return Err(RncError::Malformed("huffman table has more than 16 symbols"));
        }

        let mut lengths = [0u8; MAX_CODES];
        for len in lengths.iter_mut().take(num_codes) {
            *len = bits.input_bits(4) as u8;
        }

        Ok(Self::from_lengths(&lengths[..num_codes]))
    }

    /// Decode the next value from the bitstream: match a code against the
    /// current window, then expand its symbol with any extra bits.
    pub(crate) fn read_value(&self, bits: &mut BitWindow) -> Result<u32, RncError> {
        let window = bits.peek();
        let entry = self
            .entries
            .iter()
            .find(|e| (window & e.mask) == e.code)
            .ok_or(RncError::Malformed("no huffman code matches the bitstream"))?;

        bits.input_bits(entry.bit_len);
        let extra = match extra_bits(entry.symbol) {
            0 => 0,
            n => bits.input_bits(n),
        };

        Ok(escaped_value(entry.symbol, extra))
    }

    pub(crate) fn entries(&self) -> &[HuffEntry] {
        &self.entries
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for HuffTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(unused)");
        }

        for entry in &self.entries {
            let code = entry.code.reverse_bits() >> (16 - entry.bit_len);
            write!(
                f,
                "{}:{:0width$b} ",
                entry.symbol,
                code,
                width = entry.bit_len as usize
            )?;
        }
        Ok(())
    }
}

/// Number of raw bits that follow a bucket `symbol`
pub(crate) const fn extra_bits(symbol: u8) -> u8 {
    if symbol < 2 {
        0
    } else {
        symbol - 1
    }
}

/// Expand a bucket `symbol` and its `extra` bits into a value.
///
/// Symbols above one have an implied leading one bit at `symbol - 1`.
pub(crate) const fn escaped_value(symbol: u8, extra: u16) -> u32 {
    if symbol < 2 {
        symbol as u32
    } else {
        (1 << (symbol - 1)) | extra as u32
    }
}

/// Split a value into its (bucket symbol, extra bit count, extra bits).
/// This is the inverse of [`escaped_value`].
pub(crate) const fn value_bucket(value: u32) -> (u8, u8, u16) {
    if value < 2 {
        (value as u8, 0, 0)
    } else {
        let symbol = (32 - value.leading_zeros()) as u8;
        let extra = value - (1 << (symbol - 1));
        (symbol, symbol - 1, extra as u16)
    }
}
