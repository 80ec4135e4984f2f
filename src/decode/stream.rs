use crate::errors::RncError;
use std::ops::Range;

/// Where packed bytes are read from while unpacking
#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    /// a buffer separate from the output
    Detached(&'a [u8]),
    /// the output buffer itself, for in place unpacking
    Aliased,
}

/// Index based read and write cursors over the packed input and unpacked output.
///
/// All positions are indices into the backing slices, so aliased (in place)
/// unpacking is just a different `Source` rather than overlapping pointers.
#[derive(Debug)]
pub(crate) struct Streams<'a> {
    src: Source<'a>,
    out: &'a mut [u8],
    /// next unread packed byte
    pub(crate) src_pos: usize,
    src_end: usize,
    dst_start: usize,
    dst_pos: usize,
    dst_end: usize,
}

impl<'a> Streams<'a> {
    /// Read `src[packed]` and write up to `unpacked_len` bytes at the start of `out`
    pub(crate) fn detached(
        src: &'a [u8],
        packed: Range<usize>,
        out: &'a mut [u8],
        unpacked_len: usize,
    ) -> Self {
        debug_assert!(packed.end <= src.len() && unpacked_len <= out.len());
        Self {
            src: Source::Detached(src),
            out,
            src_pos: packed.start,
            src_end: packed.end,
            dst_start: 0,
            dst_pos: 0,
            dst_end: unpacked_len,
        }
    }

    /// Read `buf[packed]` and write up to `unpacked_len` bytes from `output_offset`,
    /// all in the same buffer.
    pub(crate) fn aliased(
        buf: &'a mut [u8],
        packed: Range<usize>,
        output_offset: usize,
        unpacked_len: usize,
    ) -> Self {
        debug_assert!(packed.end <= buf.len() && output_offset + unpacked_len <= buf.len());
        Self {
            src: Source::Aliased,
            out: buf,
            src_pos: packed.start,
            src_end: packed.end,
            dst_start: output_offset,
            dst_pos: output_offset,
            dst_end: output_offset + unpacked_len,
        }
    }

    /// Packed byte at `pos`; anything past the packed data reads as zero
    pub(crate) fn byte_at(&self, pos: usize) -> u8 {
        if pos >= self.src_end {
            return 0;
        }

        let bytes = match self.src {
            Source::Detached(src) => src,
            Source::Aliased => &*self.out,
        };
        bytes.get(pos).copied().unwrap_or(0)
    }

    /// Little endian packed word at `pos`
    pub(crate) fn word_at(&self, pos: usize) -> u16 {
        u16::from_le_bytes([self.byte_at(pos), self.byte_at(pos + 1)])
    }

    /// Take the next packed byte
    pub(crate) fn next_byte(&mut self) -> Result<u8, RncError> {
        if self.src_pos >= self.src_end {
            return Err(RncError::Malformed("packed data ended early"));
        }

        let byte = self.byte_at(self.src_pos);
        self.src_pos += 1;
        Ok(byte)
    }

    /// Copy `len` literal bytes from the packed data into the output
    pub(crate) fn copy_literals(&mut self, len: usize) -> Result<(), RncError> {
        let (src, dst) = (self.src_pos, self.dst_pos);
        if src + len > self.src_end {
            return Err(RncError::Malformed("literal run overruns packed data"));
        }
        if dst + len > self.dst_end {
            return Err(RncError::Malformed("literal run overruns unpacked size"));
        }

        match self.src {
            Source::Detached(bytes) => self.out[dst..dst + len].copy_from_slice(&bytes[src..src + len]),
            Source::Aliased => self.out.copy_within(src..src + len, dst),
        }

        self.src_pos += len;
        self.dst_pos += len;
        Ok(())
    }

    /// Copy `len` bytes starting `distance` bytes back in the output.
    ///
    /// The copy has to go byte by byte: when `distance < len` the bytes being
    /// written are read back again, repeating the pattern.
    pub(crate) fn copy_match(&mut self, distance: usize, len: usize) -> Result<(), RncError> {
        if distance == 0 || distance > self.dst_pos - self.dst_start {
            return Err(RncError::Malformed("match reaches back before the output"));
        }
        if self.dst_pos + len > self.dst_end {
            return Err(RncError::Malformed("match overruns unpacked size"));
        }

        let mut from = self.dst_pos - distance;
        for _ in 0..len {
            self.out[self.dst_pos] = self.out[from];
            self.dst_pos += 1;
            from += 1;
        }

        Ok(())
    }

    /// Number of bytes written to the output so far
    pub(crate) fn produced(&self) -> usize {
        self.dst_pos - self.dst_start
    }
}

/// Whether unpacking from `input` into `output` needs the packed data moved out
/// of the way first.
///
/// Only the end of the packed data is compared against the output region, the
/// same coarse check RNC's own in place unpacker makes.
pub(crate) fn regions_overlap(input: &Range<usize>, output: &Range<usize>) -> bool {
    !(input.end <= output.start || output.end <= input.end)
}
