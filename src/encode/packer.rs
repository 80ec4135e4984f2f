use crate::{errors::RncError, format::MIN_LENGTH};
use std::{io::Write, mem, ops::Range};

use super::{
    huffman::EncodeTable,
    lzss::{LzssByte, LzssPass, MoveBack},
};

/// Most pairs a method 1 block can count
const MAX_PAIRS: usize = 0xFFFF;
/// Longest literal run a method 1 table can encode
const MAX_RUN: usize = 0x7FFF;
/// Longest method 2 literal block
const MAX_LITERAL_BLOCK: usize = 72;
/// Shortest method 2 literal block
const MIN_LITERAL_BLOCK: usize = 12;

/// Packed data that follows the RNC header
#[derive(Debug)]
pub(super) struct Packed {
    pub payload: Vec<u8>,
    /// bytes past the unpacked size that in place unpacking needs
    pub leeway: usize,
    pub blocks: u8,
}

/// Method 1 output: bits go least significant bit first into little endian words.
///
/// A word is only reserved when the first bit is written into it, so any
/// literal bytes written in the meantime land right after the current word,
/// which is where the unpacker looks for them.
#[derive(Debug, Default)]
pub(super) struct WordPacker {
    out: Vec<u8>,
    slot: Option<usize>,
    used: u8,
}

impl WordPacker {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn write_bit(&mut self, bit: bool) {
        let slot = match self.slot {
            Some(slot) if self.used < 16 => slot,
            _ => {
                let slot = self.out.len();
                self.out.extend_from_slice(&[0, 0]);
                self.slot = Some(slot);
                self.used = 0;
                slot
            }
        };

        if bit {
            self.out[slot + usize::from(self.used >> 3)] |= 1 << (self.used & 7);
        }
        self.used += 1;
    }

    /// Write the low `n` bits of `value`, least significant bit first
    pub(super) fn write_bits(&mut self, value: u32, n: u8) {
        for i in 0..n {
            self.write_bit(((value >> i) & 1) != 0);
        }
    }

    pub(super) fn write_literals(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub(super) fn len(&self) -> usize {
        self.out.len()
    }

    /// Start of the word currently being filled
    fn word_start(&self) -> usize {
        self.slot.unwrap_or(self.out.len())
    }

    pub(super) fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// Method 2 output: bits go most significant bit first into bytes, reserved
/// lazily like [`WordPacker`] so that plain bytes land where they are read.
#[derive(Debug, Default)]
pub(super) struct BytePacker {
    out: Vec<u8>,
    slot: Option<usize>,
    used: u8,
}

impl BytePacker {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn write_bit(&mut self, bit: bool) {
        let slot = match self.slot {
            Some(slot) if self.used < 8 => slot,
            _ => {
                self.out.push(0);
                self.used = 0;
                *self.slot.insert(self.out.len() - 1)
            }
        };

        if bit {
            self.out[slot] |= 0x80 >> self.used;
        }
        self.used += 1;
    }

    /// Write the low `n` bits of `value`, most significant bit first
    pub(super) fn write_bits(&mut self, value: u32, n: u8) {
        for i in (0..n).rev() {
            self.write_bit(((value >> i) & 1) != 0);
        }
    }

    pub(super) fn write_byte(&mut self, byte: u8) {
        self.out.push(byte);
    }

    pub(super) fn write_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub(super) fn len(&self) -> usize {
        self.out.len()
    }

    pub(super) fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// Tracks how far the unpacked data can get ahead of the packed data still to be read.
///
/// When unpacking in place, the packed data sits at the end of a buffer of
/// `unpacked + leeway` bytes, and the output must never pass the read position.
/// A match is measured from the first packed byte it may read to the end of the
/// data it unpacks. Literals are copied one byte per packed byte, so a run is
/// measured from where it starts on both sides.
#[derive(Debug, Default)]
struct Leeway {
    gap: i64,
}

impl Leeway {
    /// Up to `unpacked` bytes are written while reading from `packed` onwards
    fn update(&mut self, unpacked: usize, packed: usize) {
        self.gap = self.gap.max(unpacked as i64 - packed as i64);
    }

    fn finish(&self, packed_len: usize, unpacked_len: usize) -> usize {
        (self.gap + packed_len as i64 - unpacked_len as i64).max(0) as usize
    }
}

/// A method 1 (literal run, match) pair. Literals index into the unpacked data.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pair {
    literals: Range<usize>,
    copy: Option<MoveBack>,
}

/// Group the LZSS parse into method 1 blocks, each ending with a pair that has no match
fn m1_blocks(pass: &LzssPass) -> Vec<Vec<Pair>> {
    let mut blocks = Vec::new();
    let mut pairs = Vec::new();
    let mut run_start = 0;
    let mut pos = 0;

    for token in &pass.buf {
        match *token {
            LzssByte::Uncoded(_) => {
                pos += 1;
                if pos - run_start == MAX_RUN {
                    pairs.push(Pair {
                        literals: run_start..pos,
                        copy: None,
                    });
                    blocks.push(mem::take(&mut pairs));
                    run_start = pos;
                }
            }
            LzssByte::Encoded(m) => {
                pairs.push(Pair {
                    literals: run_start..pos,
                    copy: Some(m),
                });
                pos += m.size;
                run_start = pos;

                if pairs.len() == MAX_PAIRS - 1 {
                    pairs.push(Pair {
                        literals: pos..pos,
                        copy: None,
                    });
                    blocks.push(mem::take(&mut pairs));
                }
            }
        }
    }

    if !pairs.is_empty() || run_start < pos || blocks.is_empty() {
        pairs.push(Pair {
            literals: run_start..pos,
            copy: None,
        });
        blocks.push(pairs);
    }

    blocks
}

/// Write the method 1 bitstream for `input` with its LZSS parse `pass`
pub(super) fn pack_m1(
    input: &[u8],
    pass: &LzssPass,
    log: &mut Option<&mut dyn Write>,
) -> Result<Packed, RncError> {
    let blocks = m1_blocks(pass);
    if blocks.len() > usize::from(u8::MAX) {
        return Err(RncError::TooLarge(input.len()));
    }

    let mut out = WordPacker::new();
    let mut leeway = Leeway::default();
    // lock and key flags
    out.write_bits(0, 2);

    for (n, pairs) in blocks.iter().enumerate() {
        let copies = || pairs.iter().filter_map(|p| p.copy);
        let raw = EncodeTable::from_values(pairs.iter().map(|p| p.literals.len() as u32));
        let distances = EncodeTable::from_values(copies().map(|m| (m.distance - 1) as u32));
        let lengths = EncodeTable::from_values(copies().map(|m| (m.size - MIN_LENGTH) as u32));

        if let Some(wtr) = log {
            writeln!(wtr, "# Block {} ({} pairs)", n, pairs.len())?;
            writeln!(wtr, "## Literal Run Table\n{}", raw)?;
            writeln!(wtr, "## Distance Table\n{}", distances)?;
            writeln!(wtr, "## Length Table\n{}", lengths)?;
        }

        raw.write(&mut out);
        distances.write(&mut out);
        lengths.write(&mut out);
        out.write_bits(pairs.len() as u32, 16);

        for pair in pairs {
            raw.write_value(&mut out, pair.literals.len() as u32);
            let literals = out.len();
            out.write_literals(&input[pair.literals.clone()]);
            leeway.update(pair.literals.start, literals);

            if let Some(m) = pair.copy {
                let word = out.word_start();
                distances.write_value(&mut out, (m.distance - 1) as u32);
                lengths.write_value(&mut out, (m.size - MIN_LENGTH) as u32);
                // the lookahead word is the earliest read past the current one
                let read = (word + 2).max(literals + pair.literals.len());
                leeway.update(pair.literals.end + m.size, read);
            }
        }
    }

    let payload = out.finish();
    Ok(Packed {
        leeway: leeway.finish(payload.len(), input.len()),
        blocks: blocks.len() as u8,
        payload,
    })
}

/// Write the method 2 bitstream for `input` with its LZSS parse `pass`
pub(super) fn pack_m2(
    input: &[u8],
    pass: &LzssPass,
    log: &mut Option<&mut dyn Write>,
) -> Result<Packed, RncError> {
    let mut out = BytePacker::new();
    let mut leeway = Leeway::default();
    // lock and key flags
    out.write_bits(0, 2);

    let mut run_start = 0;
    let mut pos = 0;
    for token in &pass.buf {
        match *token {
            LzssByte::Uncoded(_) => pos += 1,
            LzssByte::Encoded(m) => {
                let start = out.len();
                write_literal_run(&mut out, &input[run_start..pos]);
                leeway.update(run_start, start);

                if let Some(wtr) = log {
                    writeln!(wtr, "{:06x} - Match: length {} distance {}", pos, m.size, m.distance)?;
                }
                let start = out.len();
                write_match(&mut out, m);
                pos += m.size;
                run_start = pos;
                leeway.update(pos, start);
            }
        }
    }
    let start = out.len();
    write_literal_run(&mut out, &input[run_start..pos]);
    leeway.update(run_start, start);

    // a zero length match, then a stop bit
    out.write_bits(0b1111, 4);
    out.write_byte(0);
    out.write_bit(false);

    let payload = out.finish();
    Ok(Packed {
        leeway: leeway.finish(payload.len(), input.len()),
        blocks: 1,
        payload,
    })
}

fn write_literal_run(out: &mut BytePacker, mut bytes: &[u8]) {
    while bytes.len() >= MIN_LITERAL_BLOCK {
        let len = MAX_LITERAL_BLOCK.min(bytes.len() & !3);
        out.write_bits(0b10111, 5);
        out.write_bits((len / 4 - 3) as u32, 4);
        out.write_bytes(&bytes[..len]);
        bytes = &bytes[len..];
    }

    for &byte in bytes {
        out.write_bit(false);
        out.write_byte(byte);
    }
}

fn write_match(out: &mut BytePacker, m: MoveBack) {
    let offset = m.distance - 1;
    out.write_bit(true);

    match m.size {
        2 => {
            debug_assert!(offset < 0x100);
            out.write_bits(0b10, 2);
            out.write_byte(offset as u8);
            return;
        }
        3 => out.write_bits(0b110, 3),
        4 | 5 => out.write_bits(((m.size - 4) << 1) as u32, 3),
        6..=8 => {
            let w = (m.size - 6) as u32;
            out.write_bits(((w >> 1) << 2) | 0b10 | (w & 1), 4);
        }
        size => {
            out.write_bits(0b111, 3);
            out.write_byte((size - 8) as u8);
        }
    }

    write_offset_high(out, (offset >> 8) as u32);
    out.write_byte(offset as u8);
}

fn write_offset_high(out: &mut BytePacker, high: u32) {
    debug_assert!(high < 16);
    match high {
        0 => out.write_bit(false),
        1 => out.write_bits(0b110, 3),
        2 | 3 => out.write_bits(0b1000 | (high & 1), 4),
        4..=7 => {
            let w = high - 4;
            out.write_bits(0b10101 | ((w >> 1) << 3) | ((w & 1) << 1), 5);
        }
        _ => {
            let w = (high >> 1) - 4;
            out.write_bits(0b101000 | ((w >> 1) << 4) | ((w & 1) << 2) | (high & 1), 6);
        }
    }
}
