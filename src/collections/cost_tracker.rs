//! `CostTracker`: bucketed min-structure over small integer costs.
//!
//! One tracker exists per partition. It maps each local U-vertex index of the current block to
//! the number of its V-neighbors not yet present in that partition, and answers "which live
//! vertex is cheapest?" while costs only ever decrease.
//!
//! Costs `0..=cache_limit` live in dense buckets (one stack per cost value) with a cursor on the
//! lowest possibly non-empty bucket. Larger costs, which only high-degree vertices reach, live in
//! an ordered overflow set and migrate into the buckets once they drop to `cache_limit`.
//!
//! ### Tie-break
//! `min_index` returns the top of the lowest non-empty bucket's stack, i.e. the vertex most
//! recently placed at that cost. [`CostTracker::init`] pushes vertices in descending index
//! order, so ties among vertices whose cost has not changed resolve to the lowest index. In the
//! overflow set ties resolve to the lowest index.
//!
//! ### Performance Characteristics
//! | Operation | Complexity | Notes |
//! |-----------|------------|-------|
//! | `init` | \(O(n + L)\) | `L = cache_limit` |
//! | `min_index` | \(O(1)\) amortized | cursor only moves down on decrement |
//! | `decr_and_reorder` | \(O(1)\) | \(O(\log n)\) while the cost is above `cache_limit` |
//! | `remove` | \(O(1)\) | \(O(\log n)\) for overflow entries |

use std::collections::BTreeSet;

/// `slot` marker for vertices that were removed.
const REMOVED: u32 = u32::MAX;
/// `slot` marker for vertices stored in the overflow set.
const OVERFLOW: u32 = u32::MAX - 1;

/// Per-partition replication cost of every unassigned U-vertex in a block.
#[derive(Debug, Clone, Default)]
pub struct CostTracker {
    cost: Vec<u32>,
    /// Position inside `buckets[cost]`, or one of the markers.
    slot: Vec<u32>,
    buckets: Vec<Vec<u32>>,
    overflow: BTreeSet<(u32, u32)>,
    /// Every bucket below this index is empty.
    lowest: usize,
    live: usize,
}

impl CostTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all state with `costs[i]` for local vertex `i`.
    ///
    /// # Panics
    /// Panics if there are more than `u32::MAX - 2` vertices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn init(&mut self, costs: &[u32], cache_limit: u32) {
        assert!(costs.len() < OVERFLOW as usize, "block too large for a cost tracker");
        let limit = cache_limit as usize;

        self.cost.clear();
        self.cost.extend_from_slice(costs);
        self.slot.clear();
        self.slot.resize(costs.len(), REMOVED);
        self.buckets.truncate(limit + 1);
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.buckets.resize_with(limit + 1, Vec::new);
        self.overflow.clear();
        self.lowest = 0;
        self.live = costs.len();

        for v in (0..costs.len() as u32).rev() {
            self.place(v);
        }
    }

    #[inline]
    fn cache_limit(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let limit = self.buckets.len().saturating_sub(1) as u32;
        limit
    }

    /// Stores `v` according to its current cost.
    #[inline]
    fn place(&mut self, v: u32) {
        let c = self.cost[v as usize];
        if c <= self.cache_limit() {
            let bucket = &mut self.buckets[c as usize];
            #[allow(clippy::cast_possible_truncation)]
            let pos = bucket.len() as u32;
            bucket.push(v);
            self.slot[v as usize] = pos;
            self.lowest = self.lowest.min(c as usize);
        } else {
            self.overflow.insert((c, v));
            self.slot[v as usize] = OVERFLOW;
        }
    }

    /// Takes `v` out of whichever container holds it.
    #[inline]
    fn detach(&mut self, v: u32) {
        let pos = self.slot[v as usize];
        let c = self.cost[v as usize];
        if pos == OVERFLOW {
            let was_present = self.overflow.remove(&(c, v));
            debug_assert!(was_present, "overflow entry for {v} missing");
        } else {
            let bucket = &mut self.buckets[c as usize];
            bucket.swap_remove(pos as usize);
            if let Some(&moved) = bucket.get(pos as usize) {
                self.slot[moved as usize] = pos;
            }
        }
    }

    #[inline]
    fn assert_live(&self, v: usize) {
        assert!(v < self.slot.len(), "vertex {v} out of bounds for {}", self.slot.len());
        assert!(self.slot[v] != REMOVED, "vertex {v} was already removed");
    }

    /// Returns a live vertex of minimal cost, or `None` if every vertex was removed.
    pub fn min_index(&mut self) -> Option<usize> {
        while self.lowest < self.buckets.len() && self.buckets[self.lowest].is_empty() {
            self.lowest += 1;
        }
        if let Some(bucket) = self.buckets.get(self.lowest) {
            return bucket.last().map(|&v| v as usize);
        }
        self.overflow.first().map(|&(_, v)| v as usize)
    }

    /// Decrements the cost of `v` by one and restores the minimum invariant.
    ///
    /// # Panics
    /// Panics if `v` is out of bounds, removed, or already at cost zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decr_and_reorder(&mut self, v: usize) {
        self.assert_live(v);
        assert!(self.cost[v] > 0, "cost of vertex {v} would drop below zero");
        let v = v as u32;
        self.detach(v);
        self.cost[v as usize] -= 1;
        self.place(v);
    }

    /// Evicts `v` from consideration.
    ///
    /// # Panics
    /// Panics if `v` is out of bounds or already removed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn remove(&mut self, v: usize) {
        self.assert_live(v);
        self.detach(v as u32);
        self.slot[v] = REMOVED;
        self.live -= 1;
    }

    /// Current cost of `v`, or `None` once removed.
    pub fn cost(&self, v: usize) -> Option<u32> {
        (self.slot.get(v).copied()? != REMOVED).then(|| self.cost[v])
    }

    /// Returns `true` if `v` was removed.
    ///
    /// # Panics
    /// Panics if `v` is out of bounds.
    pub fn is_removed(&self, v: usize) -> bool {
        assert!(v < self.slot.len(), "vertex {v} out of bounds for {}", self.slot.len());
        self.slot[v] == REMOVED
    }

    /// Number of live vertices.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if every vertex was removed.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
