use std::{fmt, io::Write};

use crate::{errors::RncError, format::RncMethod};

use super::LzssBackend;

/// Configure the LZSS parse that underlies RNC compression
///
/// You can set the three key [LZSS parameters]: dictionary size, maximum match size,
/// and minimum match size, all in bytes. Each RNC method has its own
/// [defaults](LzssSettings::for_method) and its own hard limits; settings past
/// those limits are clamped when encoding.
///
/// | Parameter  | Field       | Method 1 Default | Method 2 Default | Method 1 Limit | Method 2 Limit |
/// | ---------- | ----------- | :--------------: | :--------------: | :------------: | :------------: |
/// | Dictionary | `window`    | 4096     | 4096     | 32768          | 4096           |
/// | Max Match  | `max_match` | 255      | 263      | 32769          | 263            |
/// | Min Match  | `min_match` | 2        | 2        | 2              | 2              |
///
/// Method 2 can only encode two byte matches that are at most 256 bytes back,
/// so farther two byte matches are left as literals.
///
/// [LZSS parameters]: https://michaeldipperstein.github.io/lzss.html
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LzssSettings {
    /// how far back a match can start
    pub window: usize,
    /// longest match to encode
    pub max_match: usize,
    /// shortest match to encode
    pub min_match: usize,
}

impl LzssSettings {
    pub const fn new(window: usize, max_match: usize, min_match: usize) -> Self {
        Self {
            window,
            max_match,
            min_match,
        }
    }

    /// The default settings for `method`
    pub const fn for_method(method: RncMethod) -> Self {
        match method {
            RncMethod::M1 => Self::new(4096, 255, 2),
            RncMethod::M2 => Self::new(4096, 263, 2),
        }
    }

    /// The largest settings that `method` can represent
    pub const fn limits(method: RncMethod) -> Self {
        match method {
            RncMethod::M1 => Self::new(0x8000, 0x8001, 2),
            RncMethod::M2 => Self::new(0x1000, 263, 2),
        }
    }

    /// `self`, brought within the limits of `method`
    pub fn clamped(self, method: RncMethod) -> Self {
        let limits = Self::limits(method);
        Self {
            window: self.window.clamp(1, limits.window),
            max_match: self.max_match.min(limits.max_match),
            min_match: self.min_match.max(limits.min_match),
        }
    }
}

impl Default for LzssSettings {
    fn default() -> Self {
        Self::for_method(RncMethod::M1)
    }
}

/// A back reference: copy `size` bytes from `distance` bytes back
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(super) struct MoveBack {
    pub size: usize,
    pub distance: usize,
}

impl MoveBack {
    fn new(size: usize, distance: usize) -> Self {
        Self { size, distance }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(super) enum LzssByte {
    Encoded(MoveBack),
    Uncoded(u8),
}

impl LzssByte {
    /// total number of bytes this token stands for in the unpacked data
    pub(super) fn size(&self) -> usize {
        match self {
            Self::Encoded(m) => m.size,
            Self::Uncoded(..) => 1,
        }
    }
}

#[derive(Debug)]
pub(super) struct LzssPass {
    pub buf: Vec<LzssByte>,
    pub decompressed_size: usize,
}

impl fmt::Display for LzssPass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "# LZSS Parse")?;
        let mut position = 0;
        for token in &self.buf {
            write!(f, "{:06x} - ", position)?;
            match token {
                LzssByte::Uncoded(b) => writeln!(f, "Uncoded: {:02x}", b),
                LzssByte::Encoded(m) => {
                    writeln!(f, "Encoded: size: {} distance: {}", m.size, m.distance)
                }
            }?;
            position += token.size();
        }

        Ok(())
    }
}

/// Greedy LZSS parse of `input`, taking the longest (then nearest) match
/// at every position. Debugging information will be printed to `log` if present.
pub(super) fn compress(
    input: &[u8],
    settings: LzssSettings,
    method: RncMethod,
    backend: LzssBackend,
    log: &mut Option<&mut dyn Write>,
) -> Result<LzssPass, RncError> {
    let settings = settings.clamped(method);
    let mut finder: Box<dyn MatchFinder> = match backend {
        LzssBackend::Brute => Box::new(NaiveBrute),
        LzssBackend::HashChain => Box::new(HashChain::new(input.len())),
    };

    let mut buf = Vec::with_capacity(input.len());
    let mut pos = 0;
    while pos < input.len() {
        let found = finder
            .find(input, pos, &settings)
            .filter(|m| m.size >= settings.min_match)
            .filter(|m| method != RncMethod::M2 || m.size > 2 || m.distance <= 0x100);

        let token = match found {
            Some(m) => {
                if let Some(wtr) = log {
                    writeln!(wtr, "{:06x} - match: {:?}", pos, m)?;
                }
                LzssByte::Encoded(m)
            }
            None => LzssByte::Uncoded(input[pos]),
        };

        let advance = token.size();
        finder.consumed(input, pos, advance);
        buf.push(token);
        pos += advance;
    }

    let pass = LzssPass {
        buf,
        decompressed_size: input.len(),
    };
    log::debug!(
        "lzss parse: {} bytes into {} tokens",
        pass.decompressed_size,
        pass.buf.len()
    );

    Ok(pass)
}

pub(super) trait MatchFinder {
    /// Find the best match for the data at `input[pos..]`
    fn find(&mut self, input: &[u8], pos: usize, settings: &LzssSettings) -> Option<MoveBack>;

    /// `input[pos..pos + n]` is now behind the cursor
    fn consumed(&mut self, _input: &[u8], _pos: usize, _n: usize) {}
}

/// Count the bytes that match at `input[from..]` and `input[pos..]`, up to `max`.
/// Matches may run into the data they copy.
fn match_len(input: &[u8], from: usize, pos: usize, max: usize) -> usize {
    input[from..]
        .iter()
        .zip(&input[pos..])
        .take(max)
        .take_while(|(s, d)| s == d)
        .count()
}

#[derive(Debug, Clone, Copy)]
struct NaiveBrute;
impl MatchFinder for NaiveBrute {
    fn find(&mut self, input: &[u8], pos: usize, settings: &LzssSettings) -> Option<MoveBack> {
        let longest = settings.max_match.min(input.len() - pos);
        let farthest = settings.window.min(pos);

        (1..=farthest)
            .map(|distance| MoveBack::new(match_len(input, pos - distance, pos, longest), distance))
            .filter(|m| m.size > 0)
            .fold(None, |best: Option<MoveBack>, cur| {
                best.filter(|best| best.size >= cur.size).or(Some(cur))
            })
    }
}

/// Chains of earlier positions that start with the same two bytes
#[derive(Debug)]
struct HashChain {
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl HashChain {
    const NIL: usize = usize::MAX;
    const MAX_CHAIN: usize = 512;

    fn new(input_len: usize) -> Self {
        Self {
            head: vec![Self::NIL; 1 << 16],
            prev: vec![Self::NIL; input_len],
        }
    }

    fn key(input: &[u8], pos: usize) -> Option<usize> {
        match input.get(pos..pos + 2) {
            Some(&[a, b]) => Some(usize::from(a) << 8 | usize::from(b)),
            _ => None,
        }
    }
}

impl MatchFinder for HashChain {
    fn find(&mut self, input: &[u8], pos: usize, settings: &LzssSettings) -> Option<MoveBack> {
        let key = Self::key(input, pos)?;
        let longest = settings.max_match.min(input.len() - pos);

        let mut best: Option<MoveBack> = None;
        let mut candidate = self.head[key];
        for _ in 0..Self::MAX_CHAIN {
            if candidate == Self::NIL || pos - candidate > settings.window {
                break;
            }

            let size = match_len(input, candidate, pos, longest);
            if best.map_or(true, |b| size > b.size) {
                best = Some(MoveBack::new(size, pos - candidate));
                if size == longest {
                    break;
                }
            }
            candidate = self.prev[candidate];
        }

        best
    }

    fn consumed(&mut self, input: &[u8], pos: usize, n: usize) {
        for p in pos..pos + n {
            if let Some(key) = Self::key(input, p) {
                self.prev[p] = self.head[key];
                self.head[key] = p;
            }
        }
    }
}
