use crate::{
    checksum::Crc16,
    errors::RncError,
    format::{RncHeader, RncMethod},
};
use bitstream_io::{BigEndian, BitWriter};
use std::{
    fs::File,
    io::Write,
    io::{BufReader, BufWriter, Cursor, Read},
    path::Path,
};

mod huffman;
pub(crate) mod lzss;
mod packer;

use self::{
    lzss::{LzssPass, LzssSettings},
    packer::Packed,
};

type Frequency = u64;
type LogWtr<'a> = &'a mut dyn Write;

/// The algorithm used to find matches when encoding an RNC file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LzssBackend {
    /// Naive, brute force search of the whole window
    Brute,
    /// Only check earlier positions that start with the same two bytes
    HashChain,
}

/// Packs data into an RNC file.
///
/// Start from a reader, a file ([`for_file`]), or a byte slice ([`for_bytes`]),
/// adjust the method and parse settings, then write the packed file with one of
/// the `encode_to_*` methods.
/// ```
/// # use rnc::{EncoderBuilder, LzssBackend};
/// let packed = EncoderBuilder::for_bytes(b"ABBACABBCADFEGABA")
///     .m2()
///     .lzss_backend(LzssBackend::Brute)
///     .with_logging(&mut ::std::io::sink())
///     .encode_to_vec()
///     .unwrap();
/// assert_eq!(&packed[..3], b"RNC");
/// ```
///
/// Unless changed, data is packed with method 1, the parse uses
/// [`LzssSettings::for_method`] and the [`HashChain`] backend, and nothing is logged.
///
/// [`for_file`]: EncoderBuilder::for_file
/// [`for_bytes`]: EncoderBuilder::for_bytes
/// [`HashChain`]: LzssBackend::HashChain
pub struct EncoderBuilder<'a, R> {
    rdr: R,
    method: RncMethod,
    settings: Option<LzssSettings>,
    backend: LzssBackend,
    log: Option<LogWtr<'a>>,
}

impl<'a, R: Read> EncoderBuilder<'a, R> {
    /// Pack everything `rdr` yields
    #[inline]
    pub fn for_reader(rdr: R) -> Self {
        Self {
            rdr,
            method: RncMethod::M1,
            settings: None,
            backend: LzssBackend::HashChain,
            log: None,
        }
    }

    /// Set the RNC method used to pack the data.
    ///
    /// Method 1 Huffman codes the literal runs and matches, and usually packs smaller.
    /// Method 2 uses fixed bit codes, which unpack faster.
    #[inline]
    pub fn method(&mut self, method: RncMethod) -> &mut Self {
        self.method = method;
        self
    }

    /// Convenience method to set method 1 encoding without importing [`RncMethod`].
    #[inline]
    pub fn m1(&mut self) -> &mut Self {
        self.method = RncMethod::M1;
        self
    }

    /// Convenience method to set method 2 encoding without importing [`RncMethod`].
    #[inline]
    pub fn m2(&mut self) -> &mut Self {
        self.method = RncMethod::M2;
        self
    }

    /// Override the method's default [`LzssSettings`]. Values past the method's limits are clamped.
    #[inline]
    pub fn with_lzss_settings(&mut self, settings: LzssSettings) -> &mut Self {
        self.settings = Some(settings);
        self
    }

    /// Choose how matches are searched for
    #[inline]
    pub fn lzss_backend(&mut self, backend: LzssBackend) -> &mut Self {
        self.backend = backend;
        self
    }

    /// Describe the parse, the Huffman tables, and the header in `log` while packing
    #[inline]
    pub fn with_logging<L: Write>(&mut self, log: &'a mut L) -> &mut Self {
        self.log = Some(log as LogWtr<'a>);
        self
    }

    /// Pack the input and write the RNC file to `wtr`
    #[inline]
    pub fn encode_to_writer<W: Write>(&mut self, wtr: W) -> Result<(), RncError> {
        do_encode(self, wtr)
    }

    /// Pack the input into a new file at `path`
    #[inline]
    pub fn encode_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), RncError> {
        let mut wtr = BufWriter::new(File::create(path)?);
        self.encode_to_writer(&mut wtr)?;
        wtr.flush().map_err(Into::into)
    }

    /// Pack the input into memory
    #[inline]
    pub fn encode_to_vec(&mut self) -> Result<Vec<u8>, RncError> {
        let mut packed = Vec::new();
        self.encode_to_writer(&mut packed)?;
        Ok(packed)
    }
}

impl<'a> EncoderBuilder<'a, BufReader<File>> {
    /// Pack the contents of the file at `path`
    #[inline]
    pub fn for_file<P: AsRef<Path>>(path: P) -> Result<Self, RncError> {
        File::open(path)
            .map(|f| Self::for_reader(BufReader::new(f)))
            .map_err(Into::into)
    }
}

impl<'a> EncoderBuilder<'a, Cursor<&'a [u8]>> {
    /// Pack `bytes`
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        Self::for_reader(Cursor::new(bytes))
    }
}

/// Pack everything in `rdr` with the default [`EncoderBuilder`] settings
pub fn encode<R: Read>(rdr: R) -> Result<Vec<u8>, RncError> {
    EncoderBuilder::for_reader(rdr).encode_to_vec()
}

fn do_encode<R: Read, W: Write>(
    builder: &mut EncoderBuilder<'_, R>,
    mut wtr: W,
) -> Result<(), RncError> {
    let EncoderBuilder {
        rdr,
        method,
        settings,
        backend,
        log,
    } = builder;

    let mut input = Vec::new();
    rdr.read_to_end(&mut input)?;
    let unpacked_len = u32::try_from(input.len()).map_err(|_| RncError::TooLarge(input.len()))?;

    let settings = settings.unwrap_or_else(|| LzssSettings::for_method(*method));
    let mut needed = 0;
    for attempt in leeway_retries(settings) {
        let lzss = lzss::compress(&input, attempt, *method, *backend, log)?;
        if let Some(wtr) = log {
            writeln!(wtr, "{}", &lzss)?;
        }

        let packed = match method {
            RncMethod::M1 => packer::pack_m1(&input, &lzss, log)?,
            RncMethod::M2 => packer::pack_m2(&input, &lzss, log)?,
        };
        if packed.leeway <= usize::from(u8::MAX) {
            return write_file(&mut wtr, *method, unpacked_len, &input, &lzss, &packed, log);
        }

        log::warn!(
            "{} bytes of leeway needed with a minimum match of {}, packing again",
            packed.leeway,
            attempt.min_match
        );
        needed = packed.leeway;
    }

    Err(RncError::Leeway(needed))
}

/// `settings`, then parses with fewer short matches, then literals only.
///
/// Short matches in incompressible data cost more than the bytes they replace,
/// and that growth near the end of a file is what the header's leeway has to cover.
fn leeway_retries(settings: LzssSettings) -> impl Iterator<Item = LzssSettings> {
    let longer = [3, 5, usize::MAX]
        .into_iter()
        .filter(move |&min_match| min_match > settings.min_match)
        .map(move |min_match| LzssSettings {
            min_match,
            ..settings
        });

    std::iter::once(settings).chain(longer)
}

fn write_file(
    wtr: &mut dyn Write,
    method: RncMethod,
    unpacked_len: u32,
    input: &[u8],
    lzss: &LzssPass,
    packed: &Packed,
    log: &mut Option<LogWtr>,
) -> Result<(), RncError> {
    let crc = Crc16::new();
    let header = RncHeader {
        method,
        unpacked_len,
        packed_len: u32::try_from(packed.payload.len())
            .map_err(|_| RncError::TooLarge(input.len()))?,
        unpacked_crc: crc.checksum(input),
        packed_crc: crc.checksum(&packed.payload),
        leeway: u8::try_from(packed.leeway).map_err(|_| RncError::Leeway(packed.leeway))?,
        blocks: packed.blocks,
    };

    log::debug!(
        "packed {} bytes ({} tokens) into {} with {}",
        unpacked_len,
        lzss.buf.len(),
        header.packed_len,
        method
    );
    if let Some(log) = log.as_mut() {
        writeln!(log, "# Header\n{:?}", &header)?;
    }

    let mut out = BitWriter::endian(wtr, BigEndian);
    header.write(&mut out)?;
    out.write_bytes(&packed.payload)?;

    Ok(())
}
