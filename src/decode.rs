use crate::checksum::Crc16;
use crate::errors::RncError;
use crate::format::{RncHeader, RncMethod, HEADER_LEN};
use std::{
    borrow::Cow,
    fs::File,
    io::{BufReader, Cursor, Read, Write},
    path::Path,
};

pub(crate) mod bits;
mod m1;
mod m2;
pub(crate) mod stream;

type LogWtr<'a> = &'a mut dyn Write;

/// Unpacks RNC ProPack data held in memory.
///
/// An `RncDecoder` owns the CRC-16 table used to check packed and unpacked data,
/// so build one and reuse it for as many files as needed.
///
/// All of the `unpack` functions return the number of unpacked bytes on success.
/// If the header's packed CRC does not match the packed data, nothing is written
/// to the output.
/// ```
/// # use rnc::{RncDecoder, encode};
/// let packed = encode(&b"ABBACABBACD"[..]).unwrap();
/// let mut output = [0u8; 11];
/// let rnc = RncDecoder::new();
/// assert_eq!(rnc.unpack_m1(&packed, &mut output).unwrap(), 11);
/// assert_eq!(&output, b"ABBACABBACD");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RncDecoder {
    crc: Crc16,
}

impl RncDecoder {
    pub fn new() -> Self {
        Self { crc: Crc16::new() }
    }

    /// CRC-16 of `data`, as stored in RNC headers
    #[inline]
    pub fn crc_block(&self, data: &[u8]) -> u16 {
        self.crc.checksum(data)
    }

    /// Unpack method 1 `input` (header included) into `output`.
    ///
    /// `output` has to hold at least the header's unpacked size.
    #[inline]
    pub fn unpack_m1(&self, input: &[u8], output: &mut [u8]) -> Result<usize, RncError> {
        m1::unpack(&self.crc, input, output, &mut None)
    }

    /// Unpack the method 1 data at the start of `buf` over itself.
    ///
    /// `buf` needs room for the unpacked size plus the header's leeway.
    #[inline]
    pub fn unpack_m1_in_place(&self, buf: &mut [u8]) -> Result<usize, RncError> {
        self.unpack_m1_within(buf, 0, 0)
    }

    /// Unpack the method 1 data found at `input_offset` of `buf` to
    /// `output_offset` of the same buffer.
    ///
    /// If the output region runs past the end of the packed data, the packed
    /// data is moved up to end at `output_offset + unpacked size + leeway`
    /// before unpacking, so `buf` has to reach that far.
    #[inline]
    pub fn unpack_m1_within(
        &self,
        buf: &mut [u8],
        input_offset: usize,
        output_offset: usize,
    ) -> Result<usize, RncError> {
        m1::unpack_within(&self.crc, buf, input_offset, output_offset, &mut None)
    }

    /// Unpack method 2 `input` (header included) into `output`.
    #[inline]
    pub fn unpack_m2(&self, input: &[u8], output: &mut [u8]) -> Result<usize, RncError> {
        m2::unpack(&self.crc, input, output, &mut None)
    }

    /// Unpack `input` with whichever method its header names
    #[inline]
    pub fn unpack(&self, input: &[u8], output: &mut [u8]) -> Result<usize, RncError> {
        self.unpack_logged(input, output, &mut None)
    }

    fn unpack_logged(
        &self,
        input: &[u8],
        output: &mut [u8],
        log: &mut Option<&mut dyn Write>,
    ) -> Result<usize, RncError> {
        match RncHeader::from_bytes(input)?.method {
            RncMethod::M1 => m1::unpack(&self.crc, input, output, log),
            RncMethod::M2 => m2::unpack(&self.crc, input, output, log),
        }
    }
}

/// Parse the header of `input`, which has to be packed with `method`
fn read_header(input: &[u8], method: RncMethod) -> Result<RncHeader, RncError> {
    let header = RncHeader::from_bytes(input)?;
    if header.method != method {
        log::debug!("expected {} data, found {}", method, header.method);
        return Err(RncError::NotPacked);
    }

    Ok(header)
}

fn check_packed(crc: &Crc16, header: &RncHeader, packed: &[u8]) -> Result<(), RncError> {
    if packed.is_empty() && header.unpacked_len > 0 {
        return Err(RncError::Malformed("no packed data behind a non-empty header"));
    }

    let found = crc.checksum(packed);
    if found != header.packed_crc {
        log::warn!(
            "packed crc mismatch: header {:#06x}, computed {:#06x}",
            header.packed_crc,
            found
        );
        return Err(RncError::PackedCrc {
            expected: header.packed_crc,
            found,
        });
    }

    Ok(())
}

/// Header of `input`, once its packed data is known to be whole and intact
fn verified_header(crc: &Crc16, input: &[u8]) -> Result<RncHeader, RncError> {
    let header = RncHeader::from_bytes(input)?;
    let packed = header.packed_range();
    let data = input.get(packed.clone()).ok_or(RncError::Truncated {
        needed: packed.end,
        available: input.len(),
    })?;
    check_packed(crc, &header, data)?;

    Ok(header)
}

/// A zeroed buffer for the unpacked data, or an error if it cannot be allocated
fn output_for(header: &RncHeader) -> Result<Vec<u8>, RncError> {
    let len = header.unpacked_len as usize;
    let mut output = Vec::new();
    output
        .try_reserve_exact(len)
        .map_err(|_| RncError::Allocation(len))?;
    output.resize(len, 0);

    Ok(output)
}

fn check_unpacked(crc: &Crc16, header: &RncHeader, unpacked: &[u8]) -> Result<usize, RncError> {
    let found = crc.checksum(unpacked);
    if found != header.unpacked_crc {
        log::warn!(
            "unpacked crc mismatch: header {:#06x}, computed {:#06x}",
            header.unpacked_crc,
            found
        );
        return Err(RncError::UnpackedCrc {
            expected: header.unpacked_crc,
            found,
        });
    }

    Ok(unpacked.len())
}

/// Unpacks a whole RNC file from a reader into a new `Vec<u8>`.
///
/// The input is read once and kept, so [`header`](Decoder::header) can be
/// checked before calling [`decode`](Decoder::decode).
/// ```
/// # use rnc::{EncoderBuilder, Decoder};
/// let text = b"ABBACABBACD";
/// let packed = EncoderBuilder::for_bytes(text).m2().encode_to_vec().unwrap();
///
/// let mut decoder = Decoder::for_bytes(&packed);
/// assert_eq!(decoder.header().unwrap().unpacked_len, 11);
/// assert_eq!(decoder.decode().unwrap(), text);
/// ```
pub struct Decoder<'a, R: Read> {
    src: R,
    log: Option<LogWtr<'a>>,
    input: Option<Vec<u8>>,
    rnc: RncDecoder,
}

impl<'a, R: Read> Decoder<'a, R> {
    #[inline]
    pub fn for_reader(src: R) -> Self {
        Self {
            src,
            log: None,
            input: None,
            rnc: RncDecoder::new(),
        }
    }

    /// Write a description of the header, Huffman tables, and every
    /// literal and match to `wtr` while decoding
    #[inline]
    pub fn with_logging<W: Write>(&mut self, wtr: &'a mut W) -> &mut Self {
        self.log = Some(wtr as LogWtr<'a>);
        self
    }

    #[inline]
    pub fn header(&mut self) -> Result<RncHeader, RncError> {
        self.read_input().and_then(RncHeader::from_bytes)
    }

    #[inline]
    pub fn decode(&mut self) -> Result<Vec<u8>, RncError> {
        do_decode(self)
    }

    fn read_input(&mut self) -> Result<&[u8], RncError> {
        if self.input.is_none() {
            let mut buf = Vec::new();
            self.src.read_to_end(&mut buf)?;
            self.input = Some(buf);
        }

        Ok(self.input.as_deref().unwrap_or_default())
    }
}

impl<'a> Decoder<'a, Cursor<&'a [u8]>> {
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        Self::for_reader(Cursor::new(bytes))
    }
}

impl<'a> Decoder<'a, BufReader<File>> {
    #[inline]
    pub fn for_file<P: AsRef<Path>>(p: P) -> Result<Self, RncError> {
        File::open(p)
            .map(BufReader::new)
            .map(Self::for_reader)
            .map_err(Into::into)
    }
}

/// Unpack the RNC file in `rdr`, whichever method it uses
pub fn decode<R: Read>(rdr: R) -> Result<Vec<u8>, RncError> {
    Decoder::for_reader(rdr).decode()
}

/// Read only the [`RncHeader`] at the start of `rdr`
pub fn rnc_info<R: Read>(rdr: R) -> Result<RncHeader, RncError> {
    let mut header = [0u8; HEADER_LEN];
    let mut rdr = rdr.take(HEADER_LEN as u64);
    let mut read = 0;

    while read < HEADER_LEN {
        match rdr.read(&mut header[read..])? {
            0 => break,
            n => read += n,
        }
    }

    RncHeader::from_bytes(&header[..read])
}

/// Unpack `bytes` if they are RNC data, or hand them back as they are if not.
///
/// Game archives often mix packed and plain files, so data without an RNC
/// signature is not an error here. Damaged RNC data still is.
pub fn decode_or_raw(bytes: &[u8]) -> Result<Cow<'_, [u8]>, RncError> {
    let rnc = RncDecoder::new();
    let header = match verified_header(&rnc.crc, bytes) {
        Ok(header) => header,
        Err(RncError::NotPacked) => return Ok(Cow::Borrowed(bytes)),
        Err(e) => return Err(e),
    };

    let mut output = output_for(&header)?;
    rnc.unpack(bytes, &mut output)?;

    Ok(Cow::Owned(output))
}

fn do_decode<R: Read>(opt: &mut Decoder<R>) -> Result<Vec<u8>, RncError> {
    opt.read_input()?;
    let Decoder { input, log, rnc, .. } = opt;
    let input = input.as_deref().unwrap_or_default();
    let header = verified_header(&rnc.crc, input)?;

    if let Some(wtr) = log {
        writeln!(wtr, "# Header\n{:?}", &header)?;
        writeln!(wtr, "{}\n", header.method)?;
    }

    let mut output = output_for(&header)?;
    let unpacked = rnc.unpack_logged(input, &mut output, log)?;
    output.truncate(unpacked);

    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;

    fn with_header(method: RncMethod, unpacked: &[u8], blocks: u8, payload: &[u8]) -> Vec<u8> {
        let crc = Crc16::new();
        let mut bytes = method.signature().to_be_bytes().to_vec();
        bytes.extend_from_slice(&(unpacked.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&crc.checksum(unpacked).to_be_bytes());
        bytes.extend_from_slice(&crc.checksum(payload).to_be_bytes());
        bytes.extend_from_slice(&[0, blocks]);
        bytes.extend_from_slice(payload);
        bytes
    }

    // one block, one pair: a literal run of 4
    const TEST_M1: [u8; 12] = [
        0x10, 0x00, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00, 0x54, 0x45, 0x53, 0x54,
    ];

    #[test]
    fn unpack_literal_block() {
        let packed = with_header(RncMethod::M1, b"TEST", 1, &TEST_M1);
        let mut output = [0u8; 4];

        let rnc = RncDecoder::new();
        assert_eq!(rnc.unpack_m1(&packed, &mut output).unwrap(), 4);
        assert_eq!(&output, b"TEST");
        assert_eq!(rnc.crc_block(b"TEST"), 0xEA3C);
    }

    #[test]
    fn unpack_self_referencing_match() {
        let expected = [b'a'; 11];
        let payload = [0x88, 0x88, 0x10, 0x05, 0x00, 0x20, 0x04, 0x00, 0x02, 0x00, 0x61];
        let packed = with_header(RncMethod::M1, &expected, 1, &payload);
        let mut output = [0u8; 11];

        assert_eq!(RncDecoder::new().unpack_m1(&packed, &mut output).unwrap(), 11);
        assert_eq!(output, expected);
    }

    #[test]
    fn unpack_m2_self_referencing_match() {
        let expected = [b'a'; 11];
        let payload = [0x1E, 0x61, 0x02, 0x00, 0xF0, 0x00];
        let packed = with_header(RncMethod::M2, &expected, 1, &payload);
        let mut output = [0u8; 11];

        let rnc = RncDecoder::new();
        assert_eq!(rnc.unpack_m2(&packed, &mut output).unwrap(), 11);
        assert_eq!(output, expected);

        // the generic entry point picks the method from the header
        let mut output = [0u8; 11];
        assert_eq!(rnc.unpack(&packed, &mut output).unwrap(), 11);
        assert_eq!(output, expected);
    }

    #[test]
    fn method_mismatch_is_not_packed() {
        let packed = with_header(RncMethod::M1, b"TEST", 1, &TEST_M1);
        let mut output = [0u8; 4];

        let err = RncDecoder::new().unpack_m2(&packed, &mut output).unwrap_err();
        assert!(matches!(err, RncError::NotPacked));
    }

    #[test]
    fn literal_run_past_input_is_malformed() {
        // claims a literal run of 8 with only 4 bytes behind it
        let payload = [0x14, 0x00, 0x80, 0x00, 0x20, 0x00, 0x00, 0x00, 0x54, 0x45, 0x53, 0x54];
        let packed = with_header(RncMethod::M1, b"TESTTEST", 1, &payload);
        let mut output = [0u8; 8];

        let err = RncDecoder::new().unpack_m1(&packed, &mut output).unwrap_err();
        assert!(matches!(err, RncError::Malformed(_)));
        assert_eq!(err.code(), crate::NOT_PACKED);
    }

    #[test]
    fn zero_blocks_are_malformed() {
        let packed = with_header(RncMethod::M1, b"TEST", 0, &TEST_M1);
        let mut output = [0u8; 4];

        let err = RncDecoder::new().unpack_m1(&packed, &mut output).unwrap_err();
        assert!(matches!(err, RncError::Malformed(_)));
    }

    #[test]
    fn small_output_is_rejected() {
        let packed = with_header(RncMethod::M1, b"TEST", 1, &TEST_M1);
        let mut output = [0u8; 3];

        let err = RncDecoder::new().unpack_m1(&packed, &mut output).unwrap_err();
        assert!(matches!(
            err,
            RncError::OutputTooSmall {
                needed: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn logging_decoder() {
        let packed = with_header(RncMethod::M1, b"TEST", 1, &TEST_M1);
        let mut log = Vec::new();

        let output = Decoder::for_bytes(&packed)
            .with_logging(&mut log)
            .decode()
            .unwrap();
        assert_eq!(output, b"TEST");

        let log = String::from_utf8(log).unwrap();
        assert!(log.contains("# Header"));
        assert!(log.contains("# Block 0 (1 pairs)"));
        assert!(log.contains("000000 - Literals: 4"));
    }

    #[test]
    fn info_from_reader() {
        let packed = with_header(RncMethod::M1, b"TEST", 1, &TEST_M1);
        let header = rnc_info(&packed[..]).unwrap();

        assert_eq!(header.method, RncMethod::M1);
        assert_eq!(header.unpacked_len, 4);
        assert_eq!(header.packed_len, 12);
        assert_eq!(header.blocks, 1);
        assert!(matches!(rnc_info(&b"plain"[..]), Err(RncError::NotPacked)));
    }

    #[test]
    fn raw_passthrough() {
        let plain = b"not packed at all";
        assert!(matches!(decode_or_raw(plain).unwrap(), Cow::Borrowed(_)));

        let packed = with_header(RncMethod::M1, b"TEST", 1, &TEST_M1);
        assert_eq!(&*decode_or_raw(&packed).unwrap(), b"TEST");
    }

    #[test]
    fn forged_sizes_fail_before_allocating() {
        // claims 4 GiB unpacked from an empty payload whose crc is zero
        let mut empty = b"RNC\x01".to_vec();
        empty.extend_from_slice(&u32::MAX.to_be_bytes());
        empty.extend_from_slice(&[0; 10]);
        empty[17] = 1;

        assert!(matches!(decode_or_raw(&empty), Err(RncError::Malformed(_))));
        assert!(matches!(
            Decoder::for_bytes(&empty).decode(),
            Err(RncError::Malformed(_))
        ));

        // claims more packed data than there is
        let mut short = with_header(RncMethod::M1, b"TEST", 1, &TEST_M1);
        short[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        short.truncate(HEADER_LEN + 4);
        assert!(matches!(decode_or_raw(&short), Err(RncError::Truncated { .. })));
        assert!(matches!(
            Decoder::for_bytes(&short).decode(),
            Err(RncError::Truncated { .. })
        ));
    }
}
