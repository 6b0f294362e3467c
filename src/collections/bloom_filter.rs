//! `BloomFilter`: approximate membership over hashable keys.
//!
//! Uses [`BitSet`] to store bits and double hashing to simulate `k` hash functions.
//! The filter never reports a false negative; false positives occur at a rate governed by
//! the bits-per-element budget.

use super::bit_set::BitSet;
use core::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};
use std::collections::hash_map::DefaultHasher;
use std::marker::PhantomData;

/// Smallest bit array ever allocated, so tiny blocks do not degenerate into a single word of noise.
const MIN_BITS: usize = 64;

/// Fixed-seed hasher so the same keys always map to the same bits across runs.
pub type StableState = BuildHasherDefault<DefaultHasher>;

/// A Bloom filter.
#[derive(Debug, Clone)]
pub struct BloomFilter<T, S = StableState> {
    bits: BitSet,
    /// Number of hash functions (k).
    num_hashes: u32,
    hasher: S,
    _marker: PhantomData<fn(&T)>,
}

/// Bits allocated for `expected` elements: `n * k * 1.44 * ratio`, floored at 64.
///
/// `1.44 ≈ 1 / ln 2` is the optimal bits-per-hash factor; `ratio` is an operator safety margin.
pub fn sized_bits(expected: usize, num_hashes: u32, bits_ratio: f64) -> usize {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let m = (expected as f64 * f64::from(num_hashes) * 1.44 * bits_ratio) as usize;
    m.max(MIN_BITS)
}

impl<T> BloomFilter<T> {
    /// Creates a filter for `expected` elements with `num_hashes` hash functions and the given
    /// bits-per-element margin.
    pub fn new(expected: usize, num_hashes: u32, bits_ratio: f64) -> Self {
        Self::with_bits_and_hasher(
            sized_bits(expected, num_hashes, bits_ratio),
            num_hashes,
            StableState::default(),
        )
    }
}

impl<T, S> BloomFilter<T, S> {
    /// Creates a filter with an explicit bit count and hasher.
    ///
    /// # Panics
    /// Panics if `num_hashes == 0`.
    pub fn with_bits_and_hasher(bits: usize, num_hashes: u32, hasher: S) -> Self {
        assert!(num_hashes > 0, "a Bloom filter needs at least one hash function");
        Self {
            bits: BitSet::new(bits.max(MIN_BITS)),
            num_hashes,
            hasher,
            _marker: PhantomData,
        }
    }

    /// Clears the filter and resizes it for `expected` elements, keeping `k`.
    pub fn reset(&mut self, expected: usize, bits_ratio: f64) {
        self.bits.reset(sized_bits(expected, self.num_hashes, bits_ratio));
    }

    /// Size of the bit array (m).
    pub fn bit_size(&self) -> usize {
        self.bits.universe()
    }

    /// Number of hash functions (k).
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Returns the number of bits set (approximate load).
    pub fn set_bits_count(&self) -> usize {
        self.bits.len()
    }

    /// Heap bytes held by the bit array.
    pub fn memory_bytes(&self) -> usize {
        self.bits.memory_bytes()
    }
}

impl<T, S> BloomFilter<T, S>
where
    T: Hash,
    S: BuildHasher,
{
    fn hashes(&self, item: &T) -> (u64, u64) {
        let mut hasher = self.hasher.build_hasher();
        item.hash(&mut hasher);
        let h1 = hasher.finish();

        // Second hash from MurmurHash3's 64-bit finalizer, so the item is traversed once.
        let mut h2 = h1;
        h2 = (h2 ^ (h2 >> 33)).wrapping_mul(0xff51_afd7_ed55_8ccd);
        h2 = (h2 ^ (h2 >> 33)).wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        h2 ^= h2 >> 33;

        (h1, h2)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn probe(h1: u64, h2: u64, i: u32, m: u64) -> usize {
        (h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % m) as usize
    }

    /// Adds an item.
    pub fn insert(&mut self, item: &T) {
        let (h1, h2) = self.hashes(item);
        let m = self.bits.universe() as u64;
        for i in 0..self.num_hashes {
            self.bits.insert(Self::probe(h1, h2, i, m));
        }
    }

    /// Checks if an item is possibly present.
    pub fn contains(&self, item: &T) -> bool {
        let (h1, h2) = self.hashes(item);
        let m = self.bits.universe() as u64;
        (0..self.num_hashes).all(|i| self.bits.contains(Self::probe(h1, h2, i, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing_policy() {
        // 1000 * 4 * 1.44 * 1.0
        assert_eq!(sized_bits(1000, 4, 1.0), 5760);
        assert_eq!(sized_bits(1000, 4, 2.0), 11520);
        assert_eq!(sized_bits(0, 4, 1.0), MIN_BITS);
    }

    #[test]
    fn test_bloom_basic() {
        let mut bloom = BloomFilter::new(100, 4, 1.0);
        bloom.insert(&7u64);
        bloom.insert(&11u64);

        assert!(bloom.contains(&7));
        assert!(bloom.contains(&11));
    }

    #[test]
    fn test_bloom_fp_rate() {
        // k = 4, ~5.76 bits per element: theoretical rate is a few percent.
        let mut bloom = BloomFilter::new(1000, 4, 1.0);
        for i in 0..1000u64 {
            bloom.insert(&i);
        }

        for i in 0..1000u64 {
            assert!(bloom.contains(&i));
        }

        let trials = 10_000u64;
        let fp_count = (1000..1000 + trials).filter(|i| bloom.contains(i)).count();
        #[allow(clippy::cast_precision_loss)]
        let measured_rate = fp_count as f64 / trials as f64;
        assert!(measured_rate < 0.25, "FP rate too high: {measured_rate}");
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut bloom = BloomFilter::new(10, 3, 1.0);
        for i in 0..10u64 {
            bloom.insert(&i);
        }
        bloom.reset(500, 1.0);
        assert_eq!(bloom.set_bits_count(), 0);
        assert_eq!(bloom.bit_size(), sized_bits(500, 3, 1.0));
    }
}
