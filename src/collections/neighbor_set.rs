//! Per-partition neighbor sets: "is V-vertex `key` already present in partition `k`?".
//!
//! Each partition owns one membership set over global V-keys. The sets only grow while a block
//! is processed and are rebuilt from the pulled global snapshot at the start of the next block.
//!
//! Two representations are available, selected by [`NeighborSetMode`]:
//! - `Exact`: a `HashSet` per partition, zero false positives.
//! - `Approximate`: a [`BloomFilter`] per partition sized `n * k * 1.44 * ratio` bits for the
//!   `n` keys of the block. No false negatives; a false positive makes the engine believe a
//!   neighbor is already replicated, which can only under-count replication cost.

use super::bloom_filter::BloomFilter;
use crate::config::NeighborSetMode;
use crate::sync::{GlobalKey, PartitionId, PartitionMask};
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Membership {
    Exact(HashSet<GlobalKey>),
    Approximate(BloomFilter<GlobalKey>),
}

impl Membership {
    #[inline]
    fn contains(&self, key: GlobalKey) -> bool {
        match self {
            Membership::Exact(set) => set.contains(&key),
            Membership::Approximate(bloom) => bloom.contains(&key),
        }
    }

    #[inline]
    fn insert(&mut self, key: GlobalKey) {
        match self {
            Membership::Exact(set) => {
                set.insert(key);
            }
            Membership::Approximate(bloom) => bloom.insert(&key),
        }
    }

    fn memory_bytes(&self) -> usize {
        match self {
            Membership::Exact(set) => set.capacity() * std::mem::size_of::<GlobalKey>(),
            Membership::Approximate(bloom) => bloom.memory_bytes(),
        }
    }
}

/// One membership set per partition.
#[derive(Debug, Clone)]
pub struct NeighborSetTracker {
    mode: NeighborSetMode,
    sets: Vec<Membership>,
}

impl NeighborSetTracker {
    /// Creates a tracker with no partitions; call [`reset`](Self::reset) or
    /// [`rebuild`](Self::rebuild) before use.
    pub fn new(mode: NeighborSetMode) -> Self {
        Self {
            mode,
            sets: Vec::new(),
        }
    }

    /// Number of partitions tracked.
    pub fn num_partitions(&self) -> usize {
        self.sets.len()
    }

    /// Membership representation in use.
    pub fn mode(&self) -> NeighborSetMode {
        self.mode
    }

    /// Empties every set and sizes them for `expected_size` keys.
    pub fn reset(&mut self, num_partitions: usize, expected_size: usize) {
        self.sets.truncate(num_partitions);
        for set in &mut self.sets {
            match (set, self.mode) {
                (Membership::Exact(set), _) => set.clear(),
                (Membership::Approximate(bloom), NeighborSetMode::Approximate { bits_ratio, .. }) => {
                    bloom.reset(expected_size, bits_ratio);
                }
                (Membership::Approximate(_), NeighborSetMode::Exact) => {
                    unreachable!("membership representation never changes after construction")
                }
            }
        }
        while self.sets.len() < num_partitions {
            self.sets.push(self.fresh(expected_size));
        }
    }

    fn fresh(&self, expected_size: usize) -> Membership {
        match self.mode {
            NeighborSetMode::Exact => Membership::Exact(HashSet::with_capacity(expected_size)),
            NeighborSetMode::Approximate {
                hash_count,
                bits_ratio,
            } => Membership::Approximate(BloomFilter::new(expected_size, hash_count, bits_ratio)),
        }
    }

    /// Resets to `num_partitions` sets and inserts every key into each partition whose bit is
    /// set in its mask. Bits at or above `num_partitions` are ignored.
    ///
    /// # Panics
    /// Panics if `keys` and `masks` differ in length.
    pub fn rebuild(&mut self, num_partitions: usize, keys: &[GlobalKey], masks: &[PartitionMask]) {
        assert_eq!(
            keys.len(),
            masks.len(),
            "every pulled key needs exactly one partition mask"
        );
        self.reset(num_partitions, keys.len());

        for (&key, &mask) in keys.iter().zip(masks) {
            if mask.is_empty() {
                continue;
            }
            for partition in mask.iter() {
                if let Some(set) = self.sets.get_mut(partition as usize) {
                    set.insert(key);
                }
            }
        }
    }

    /// Returns `true` if `key` is (possibly, in approximate mode) present in `partition`.
    #[inline]
    pub fn contains(&self, partition: PartitionId, key: GlobalKey) -> bool {
        self.sets[partition as usize].contains(key)
    }

    /// Records `key` as present in `partition`.
    #[inline]
    pub fn insert(&mut self, partition: PartitionId, key: GlobalKey) {
        self.sets[partition as usize].insert(key);
    }

    /// Heap bytes across every partition's set.
    pub fn memory_bytes(&self) -> usize {
        self.sets.iter().map(Membership::memory_bytes).sum()
    }
}
