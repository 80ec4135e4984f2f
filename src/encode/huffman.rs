use crate::format::{value_bucket, HuffTable, MAX_CODES};
use std::{cmp::Ordering, collections::BinaryHeap, fmt};

use smallvec::SmallVec;

use super::{packer::WordPacker, Frequency};

/// A method 1 Huffman table, ready for encoding values
#[derive(Debug)]
pub(super) struct EncodeTable {
    /// bit length for each symbol, up to the last used symbol
    lengths: SmallVec<[u8; MAX_CODES]>,
    /// (code, bit length) for each symbol, with the code stored as it is
    /// written to the least significant bit first stream
    codes: [(u16, u8); MAX_CODES],
}

impl EncodeTable {
    /// Build a table for all of the `values` that will be written with it
    pub(super) fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut freqs = [0; MAX_CODES];
        for value in values {
            let (symbol, _, _) = value_bucket(value);
            freqs[symbol as usize] += 1;
        }

        Self::from_lengths(code_lengths(&freqs))
    }

    fn from_lengths(mut lengths: SmallVec<[u8; MAX_CODES]>) -> Self {
        let used = lengths.iter().rposition(|&l| l != 0).map_or(0, |i| i + 1);
        lengths.truncate(used);

        let mut codes = [(0, 0); MAX_CODES];
        for entry in HuffTable::from_lengths(&lengths).entries() {
            codes[entry.symbol as usize] = (entry.code, entry.bit_len);
        }

        Self { lengths, codes }
    }

    /// Write the table description: a five bit symbol count, then four bits per symbol
    pub(super) fn write(&self, out: &mut WordPacker) {
        out.write_bits(self.lengths.len() as u32, 5);
        for &len in &self.lengths {
            out.write_bits(u32::from(len), 4);
        }
    }

    /// Write the code for `value`'s bucket, then its extra bits
    pub(super) fn write_value(&self, out: &mut WordPacker, value: u32) {
        let (symbol, extra_len, extra) = value_bucket(value);
        let (code, bit_len) = self.codes[symbol as usize];
        debug_assert!(bit_len > 0, "no code for symbol {}", symbol);

        out.write_bits(u32::from(code), bit_len);
        out.write_bits(u32::from(extra), extra_len);
    }
}

impl fmt::Display for EncodeTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&HuffTable::from_lengths(&self.lengths), f)
    }
}

/// Huffman code lengths for every symbol in `freqs`. Unused symbols get a length of zero.
///
/// A lone symbol still needs a one bit code.
fn code_lengths(freqs: &[Frequency]) -> SmallVec<[u8; MAX_CODES]> {
    let mut lengths: SmallVec<[u8; MAX_CODES]> = SmallVec::from_elem(0, freqs.len());
    let mut heap: BinaryHeap<TreeNode> = freqs
        .iter()
        .enumerate()
        .filter(|(_, &freq)| freq > 0)
        .map(|(symbol, &freq)| TreeNode::Leaf {
            symbol: symbol as u8,
            freq,
        })
        .collect();

    while heap.len() >= 2 {
        if let (Some(l), Some(r)) = (heap.pop(), heap.pop()) {
            heap.push(TreeNode::combine(l, r));
        }
    }

    match heap.pop() {
        Some(TreeNode::Leaf { symbol, .. }) => lengths[symbol as usize] = 1,
        Some(root) => root.depths(0, &mut lengths),
        None => {}
    }

    lengths
}

enum TreeNode {
    Leaf {
        symbol: u8,
        freq: Frequency,
    },
    Node {
        freq: Frequency,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn freq(&self) -> Frequency {
        match self {
            Self::Leaf { freq, .. } => *freq,
            Self::Node { freq, .. } => *freq,
        }
    }

    fn combine(l: Self, r: Self) -> Self {
        Self::Node {
            freq: l.freq() + r.freq(),
            left: Box::new(l),
            right: Box::new(r),
        }
    }

    fn depths(&self, depth: u8, lengths: &mut [u8]) {
        match self {
            Self::Leaf { symbol, .. } => lengths[*symbol as usize] = depth,
            Self::Node { left, right, .. } => {
                left.depths(depth + 1, lengths);
                right.depths(depth + 1, lengths);
            }
        }
    }
}

impl Ord for TreeNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.freq().cmp(&other.freq()).reverse()
    }
}

impl PartialOrd for TreeNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.freq() == other.freq()
    }
}

impl Eq for TreeNode {}

#[cfg(test)]
mod test {
    use super::*;

    /// Kraft sum of the used lengths, scaled by 2^15
    fn kraft(lengths: &[u8]) -> u32 {
        lengths
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| 1 << (15 - l))
            .sum()
    }

    #[test]
    fn lengths_follow_frequency() {
        let lengths = code_lengths(&[10, 1, 1, 5, 0, 2]);

        assert_eq!(lengths[4], 0);
        assert_eq!(lengths[0], 1);
        assert!(lengths[3] <= lengths[5]);
        assert!(lengths[5] <= lengths[1]);
        assert_eq!(kraft(&lengths), 1 << 15);
    }

    #[test]
    fn single_symbol_gets_one_bit() {
        let mut freqs = [0; MAX_CODES];
        freqs[7] = 100;
        let lengths = code_lengths(&freqs);

        assert_eq!(lengths[7], 1);
        assert_eq!(lengths.iter().filter(|&&l| l != 0).count(), 1);
    }

    #[test]
    fn skewed_frequencies_fit_the_table() {
        // fibonacci weights give the deepest possible tree
        let mut freqs = [0; MAX_CODES];
        let (mut a, mut b) = (1, 1);
        for freq in freqs.iter_mut() {
            *freq = a;
            let next = a + b;
            a = b;
            b = next;
        }

        let lengths = code_lengths(&freqs);
        assert!(lengths.iter().all(|&l| (1..=15).contains(&l)));
        assert_eq!(kraft(&lengths), 1 << 15);
    }

    #[test]
    fn table_trims_unused_tail() {
        let table = EncodeTable::from_values(vec![0, 0, 1, 5]);
        // 5 is bucket 3, so symbols 0..=3 are described
        assert_eq!(table.lengths.len(), 4);
        assert_eq!(table.lengths[2], 0);

        let empty = EncodeTable::from_values(Vec::new());
        assert!(empty.lengths.is_empty());
    }
}
