use super::stream::Streams;
use crate::errors::RncError;

/// Longest literal run that is believed, no matter how much input is left
const MAX_LITERAL_RUN: usize = 0xFF00_0000;

/// Method 1 bit reader.
///
/// `low` always holds the next sixteen bits of the stream. The last `count`
/// bits of the current word sit at the bottom of `low`, while `high` holds the
/// rest of the little endian word at `io.src_pos`, which is already in use as
/// lookahead.
#[derive(Debug)]
pub(crate) struct BitWindow<'a> {
    pub(crate) io: Streams<'a>,
    low: u16,
    high: u16,
    count: u8,
    /// packed bytes left from `io.src_pos`, as declared by the input size
    remaining: i64,
}

impl<'a> BitWindow<'a> {
    pub(crate) fn new(io: Streams<'a>, input_left: i64) -> Self {
        let low = io.word_at(io.src_pos);
        Self {
            io,
            low,
            high: 0,
            count: 0,
            remaining: input_left,
        }
    }

    /// Look at the next sixteen bits without consuming them
    pub(crate) fn peek(&self) -> u16 {
        self.low
    }

    /// Consume the next `amount` bits (at most sixteen)
    pub(crate) fn input_bits(&mut self, amount: u8) -> u16 {
        debug_assert!(amount <= 16);
        let mut amount = u32::from(amount);
        let mut high = u32::from(self.high);
        let mut low = u32::from(self.low);
        let mut count = i32::from(self.count);

        let value = (low & ((1 << amount) - 1)) as u16;
        count -= amount as i32;

        if count < 0 {
            // finish the current word, then pull in the next lookahead word
            count += amount as i32;
            let rem = (high << (16 - count)) & 0xFFFF;
            low = (low >> count) | rem;

            self.io.src_pos += 2;
            self.remaining -= 2;
            high = match self.remaining {
                r if r <= 0 => 0,
                1 => u32::from(self.io.byte_at(self.io.src_pos)),
                _ => u32::from(self.io.word_at(self.io.src_pos)),
            };

            amount -= count as u32;
            count = 16 - amount as i32;
        }

        let rem = (high << (16 - amount)) & 0xFFFF;
        self.high = (high >> amount) as u16;
        self.low = ((low >> amount) | rem) as u16;
        self.count = count as u8;

        value
    }

    /// Copy a literal run out of the packed data, then rebuild the window
    /// from the bytes that follow it
    pub(crate) fn copy_literals(&mut self, len: usize) -> Result<(), RncError> {
        if len as i64 > self.remaining || len > MAX_LITERAL_RUN {
            return Err(RncError::Malformed("literal run is longer than the remaining input"));
        }

        self.io.copy_literals(len)?;
        self.remaining -= len as i64;

        let a = u32::from(self.io.word_at(self.io.src_pos));
        let b = u32::from(self.io.word_at(self.io.src_pos + 2));
        let count = u32::from(self.count);

        self.low = ((u32::from(self.low) & ((1 << count) - 1)) | (a << count)) as u16;
        self.high = ((a >> (16 - count)) | (b << count)) as u16;

        Ok(())
    }
}

/// Method 2 bit reader: flag bits come most significant bit first,
/// one packed byte at a time.
#[derive(Debug)]
pub(crate) struct BitByte<'a> {
    pub(crate) io: Streams<'a>,
    buf: u8,
    count: u8,
}

impl<'a> BitByte<'a> {
    pub(crate) fn new(io: Streams<'a>) -> Self {
        Self { io, buf: 0, count: 0 }
    }

    pub(crate) fn bit(&mut self) -> Result<bool, RncError> {
        if self.count == 0 {
            self.buf = self.io.next_byte()?;
            self.count = 8;
        }

        let bit = (self.buf & 0x80) != 0;
        self.buf <<= 1;
        self.count -= 1;

        Ok(bit)
    }

    /// Read `n` bits as a most significant bit first number
    pub(crate) fn bits(&mut self, n: u8) -> Result<u16, RncError> {
        let mut val = 0;
        for _ in 0..n {
            val = (val << 1) | self.bit()? as u16;
        }
        Ok(val)
    }
}
