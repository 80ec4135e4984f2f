use super::{bits::BitByte, check_packed, check_unpacked, read_header, stream::Streams};
use crate::{checksum::Crc16, errors::RncError, format::RncMethod};
use std::io::Write;

/// Unpack method 2 `input` into `output`
pub(super) fn unpack(
    crc: &Crc16,
    input: &[u8],
    output: &mut [u8],
    log: &mut Option<&mut dyn Write>,
) -> Result<usize, RncError> {
    let header = read_header(input, RncMethod::M2)?;
    let packed = header.packed_range();
    let data = input.get(packed.clone()).ok_or(RncError::Truncated {
        needed: packed.end,
        available: input.len(),
    })?;
    check_packed(crc, &header, data)?;

    let unpacked_len = header.unpacked_len as usize;
    if output.len() < unpacked_len {
        return Err(RncError::OutputTooSmall {
            needed: unpacked_len,
            available: output.len(),
        });
    }

    let io = Streams::detached(input, packed, output, unpacked_len);
    decode_stream(io, log)?;

    check_unpacked(crc, &header, &output[..unpacked_len])
}

/// Method 2 grammar, with flag bits read one at a time:
///
/// ```text
/// 0 <byte>                      literal
/// 1 1 0 <byte>                  length 2, offset < 256
/// 1 1 1 0 <hi> <byte>           length 3
/// 1 1 1 1 <n> <hi> <byte>       length n + 8, for n in 1..=255
/// 1 1 1 1 <0> 1                 nothing; keep going
/// 1 1 1 1 <0> 0                 end of data
/// 1 0 x 0 <hi> <byte>           length 4 + x
/// 1 0 x 1 y <hi> <byte>         length 6 + 2x + y (6, 7, or 8)
/// 1 0 1 1 1 nnnn <bytes>        (n + 3) * 4 literals
/// ```
/// `<hi>` is the high byte of the match offset, see [`offset_high`].
fn decode_stream(io: Streams, log: &mut Option<&mut dyn Write>) -> Result<usize, RncError> {
    let mut bits = BitByte::new(io);
    // lock and key flags
    bits.bit()?;
    bits.bit()?;

    loop {
        while !bits.bit()? {
            if let Some(wtr) = log {
                let pos = bits.io.produced();
                writeln!(wtr, "{:06x} - Literal: {:02x}", pos, bits.io.byte_at(bits.io.src_pos))?;
            }
            bits.io.copy_literals(1)?;
        }

        let mut len: usize = 2;
        let load_high;
        if !bits.bit()? {
            len = (len << 1) | bits.bit()? as usize;
            if bits.bit()? {
                len -= 1;
                len = (len << 1) | bits.bit()? as usize;
                if len == 9 {
                    let run = (bits.bits(4)? as usize + 3) * 4;
                    if let Some(wtr) = log {
                        writeln!(wtr, "{:06x} - Literal Block: {}", bits.io.produced(), run)?;
                    }
                    bits.io.copy_literals(run)?;
                    continue;
                }
            }
            load_high = true;
        } else if bits.bit()? {
            len += 1;
            if bits.bit()? {
                len = bits.io.next_byte()? as usize;
                if len == 0 {
                    if bits.bit()? {
                        continue;
                    }
                    break;
                }
                len += 8;
            }
            load_high = true;
        } else {
            load_high = false;
        }

        let high = if load_high { offset_high(&mut bits)? } else { 0 };
        let offset = (high << 8) | bits.io.next_byte()? as usize;

        if let Some(wtr) = log {
            writeln!(
                wtr,
                "{:06x} - Match: length {} distance {}",
                bits.io.produced(),
                len,
                offset + 1
            )?;
        }
        bits.io.copy_match(offset + 1, len)?;
    }

    Ok(bits.io.produced())
}

/// High byte of a match offset (`0..=15`):
///
/// ```text
/// 0              0
/// 1 1 0          1
/// 1 0 0 x        2 + x
/// 1 a 1 b 1      4 + 2a + b
/// 1 a 1 b 0 x    8 + 4a + 2b + x
/// ```
fn offset_high(bits: &mut BitByte) -> Result<usize, RncError> {
    if !bits.bit()? {
        return Ok(0);
    }

    let mut high = bits.bit()? as usize;
    if bits.bit()? {
        high = ((high << 1) | bits.bit()? as usize) | 4;
        if !bits.bit()? {
            high = (high << 1) | bits.bit()? as usize;
        }
    } else if high == 0 {
        high = 2 | bits.bit()? as usize;
    }

    Ok(high)
}
