use super::{
    bits::BitWindow,
    check_packed, check_unpacked, read_header,
    stream::{regions_overlap, Streams},
};
use crate::{
    checksum::Crc16,
    errors::RncError,
    format::{HuffTable, RncHeader, RncMethod, HEADER_LEN, MIN_LENGTH},
};
use std::io::Write;

/// Unpack method 1 `input` into the separate `output` buffer
pub(super) fn unpack(
    crc: &Crc16,
    input: &[u8],
    output: &mut [u8],
    log: &mut Option<&mut dyn Write>,
) -> Result<usize, RncError> {
    let header = read_header(input, RncMethod::M1)?;
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

    let input_left = (input.len() - HEADER_LEN) as i64;
    let io = Streams::detached(input, packed, output, unpacked_len);
    decode_blocks(io, input_left, &header, log)?;

    check_unpacked(crc, &header, &output[..unpacked_len])
}

/// Unpack method 1 data at `input_offset` of `buf` to `output_offset` of the same buffer.
///
/// If the output would run over the end of the packed data, the packed data is
/// first moved to the end of the output area (unpacked size plus leeway), and
/// unpacked from there.
pub(super) fn unpack_within(
    crc: &Crc16,
    buf: &mut [u8],
    input_offset: usize,
    output_offset: usize,
    log: &mut Option<&mut dyn Write>,
) -> Result<usize, RncError> {
    let header = read_header(buf.get(input_offset..).unwrap_or(&[]), RncMethod::M1)?;
    let packed_len = header.packed_len as usize;
    let unpacked_len = header.unpacked_len as usize;

    let input = input_offset..input_offset + HEADER_LEN + packed_len;
    if input.end > buf.len() {
        return Err(RncError::Truncated {
            needed: input.end - input_offset,
            available: buf.len() - input_offset,
        });
    }
    let mut packed = input.start + HEADER_LEN..input.end;
    check_packed(crc, &header, &buf[packed.clone()])?;

    let output = output_offset..output_offset + header.required_output_len();
    if regions_overlap(&input, &output) {
        if output.end > buf.len() {
            return Err(RncError::OutputTooSmall {
                needed: output.end,
                available: buf.len(),
            });
        }

        let relocated = output
            .end
            .checked_sub(packed_len)
            .filter(|&start| start >= output_offset)
            .ok_or(RncError::Malformed("packed data is larger than its output area"))?;
        log::debug!(
            "moving {} packed bytes from {:#x} to {:#x} before unpacking",
            packed_len,
            packed.start,
            relocated
        );
        buf.copy_within(packed, relocated);
        packed = relocated..output.end;
    }

    if output_offset + unpacked_len > buf.len() {
        return Err(RncError::OutputTooSmall {
            needed: output_offset + unpacked_len,
            available: buf.len(),
        });
    }

    let io = Streams::aliased(buf, packed, output_offset, unpacked_len);
    decode_blocks(io, packed_len as i64, &header, log)?;

    check_unpacked(crc, &header, &buf[output_offset..output_offset + unpacked_len])
}

fn decode_blocks(
    io: Streams,
    input_left: i64,
    header: &RncHeader,
    log: &mut Option<&mut dyn Write>,
) -> Result<usize, RncError> {
    if header.blocks == 0 {
        return Err(RncError::Malformed("header declares no blocks"));
    }

    let mut bits = BitWindow::new(io, input_left);
    // lock and key flags
    bits.input_bits(2);

    for block in 0..header.blocks {
        let raw = HuffTable::from_window(&mut bits)?;
        let distances = HuffTable::from_window(&mut bits)?;
        let lengths = HuffTable::from_window(&mut bits)?;
        let pairs = bits.input_bits(16);

        log::trace!("block {}: {} pairs", block, pairs);
        if let Some(wtr) = log {
            writeln!(wtr, "# Block {} ({} pairs)", block, pairs)?;
            writeln!(wtr, "## Literal Run Table\n{}", raw)?;
            writeln!(wtr, "## Distance Table\n{}", distances)?;
            writeln!(wtr, "## Length Table\n{}", lengths)?;
        }

        if pairs == 0 {
            return Err(RncError::Malformed("block holds no pairs"));
        }

        for remaining in (1..=pairs).rev() {
            let run = raw.read_value(&mut bits)? as usize;
            if run > 0 {
                if let Some(wtr) = log {
                    writeln!(wtr, "{:06x} - Literals: {}", bits.io.produced(), run)?;
                }
                bits.copy_literals(run)?;
            }

            // the last pair of a block is only a literal run
            if remaining > 1 {
                let distance = distances.read_value(&mut bits)? as usize + 1;
                let length = lengths.read_value(&mut bits)? as usize + MIN_LENGTH;

                if let Some(wtr) = log {
                    writeln!(
                        wtr,
                        "{:06x} - Match: length {} distance {}",
                        bits.io.produced(),
                        length,
                        distance
                    )?;
                }
                bits.io.copy_match(distance, length)?;
            }
        }
    }

    Ok(bits.io.produced())
}
