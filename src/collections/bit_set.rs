//! `BitSet`: a fixed-universe bit set backed by `u64` words.
//!
//! Used for the per-block `assigned` flags of U-vertices and as the bit array of
//! [`BloomFilter`](super::BloomFilter). The universe size is fixed at construction (or by
//! [`BitSet::reset`]); out-of-universe bits are a contract violation.

/// A bit set over `0..universe`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
    universe: usize,
    /// Number of set bits.
    len: usize,
}

impl BitSet {
    /// Creates an empty set over `0..universe`.
    pub fn new(universe: usize) -> Self {
        Self {
            words: vec![0; universe.div_ceil(64)],
            universe,
            len: 0,
        }
    }

    /// Clears every bit and changes the universe to `0..universe`, reusing the allocation.
    pub fn reset(&mut self, universe: usize) {
        self.words.clear();
        self.words.resize(universe.div_ceil(64), 0);
        self.universe = universe;
        self.len = 0;
    }

    /// Clears every bit, keeping the universe.
    pub fn clear(&mut self) {
        self.words.fill(0);
        self.len = 0;
    }

    /// Size of the universe.
    #[inline]
    pub fn universe(&self) -> usize {
        self.universe
    }

    /// Returns the number of set bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sets `bit`. Returns `true` if it was not already set.
    ///
    /// # Panics
    /// Panics if `bit >= universe`.
    #[inline]
    pub fn insert(&mut self, bit: usize) -> bool {
        assert!(bit < self.universe, "bit {bit} out of universe {}", self.universe);
        let word = &mut self.words[bit / 64];
        let mask = 1u64 << (bit % 64);
        if *word & mask == 0 {
            *word |= mask;
            self.len += 1;
            true
        } else {
            false
        }
    }

    /// Clears `bit`. Returns `true` if it was set.
    ///
    /// # Panics
    /// Panics if `bit >= universe`.
    pub fn remove(&mut self, bit: usize) -> bool {
        assert!(bit < self.universe, "bit {bit} out of universe {}", self.universe);
        let word = &mut self.words[bit / 64];
        let mask = 1u64 << (bit % 64);
        if *word & mask != 0 {
            *word &= !mask;
            self.len -= 1;
            true
        } else {
            false
        }
    }

    /// Returns `true` if `bit` is set.
    ///
    /// # Panics
    /// Panics if `bit >= universe`.
    #[inline]
    pub fn contains(&self, bit: usize) -> bool {
        assert!(bit < self.universe, "bit {bit} out of universe {}", self.universe);
        self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    /// Iterates the set bits in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let tz = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(w * 64 + tz)
            })
        })
    }

    /// Heap bytes held by the word array.
    pub fn memory_bytes(&self) -> usize {
        self.words.capacity() * std::mem::size_of::<u64>()
    }
}
