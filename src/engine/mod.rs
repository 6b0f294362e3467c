//! `PartitionEngine`: greedy streaming vertex-cut assignment of one block at a time.
//!
//! For every block the engine:
//! 1. waits for the pulled partition masks of the block's keys,
//! 2. rebuilds the per-partition neighbor sets from them,
//! 3. initializes one [`CostTracker`] per partition, where the cost of a U-vertex is the number
//!    of its V-neighbors missing from that partition,
//! 4. runs the greedy loop: round `i` gives partition `i % K` its cheapest unassigned vertex,
//!    then adds that vertex's missing neighbors to the partition and lowers the cost of every
//!    other unassigned vertex sharing them,
//! 5. pushes the OR of the bits it added per key back to the store.
//!
//! Rotating the partition rather than searching the cheapest partition per vertex gives every
//! partition `floor(n / K)` or `ceil(n / K)` vertices of each block.

mod block;

pub use block::BlockData;

use crate::collections::{BitSet, CostTracker, NeighborSetTracker};
use crate::config::PartitionConfig;
use crate::error::{PartitionError, Result};
use crate::graph::Graph;
use crate::sync::{
    CacheHint, GlobalKey, MergeOp, PartitionId, PartitionMask, PushHandle, PushRequest,
    SyncChannel,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What partitioning one block did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockStats {
    /// Block (channel) id.
    pub block_id: u64,
    /// U-vertices assigned.
    pub rows: usize,
    /// Unique V-keys referenced.
    pub keys: usize,
    /// `(key, partition)` pairs newly added to a neighbor set.
    pub added_replicas: usize,
    /// Keys sent in the block's push; zero when nothing was pushed.
    pub pushed_keys: usize,
}

/// A partitioned block handed to the output stage.
#[derive(Debug)]
pub struct PartitionedBlock<E> {
    /// Examples in their original order.
    pub examples: Vec<E>,
    /// `assignment[i]` is the partition of example `i`.
    pub assignment: Vec<PartitionId>,
    /// Block statistics.
    pub stats: BlockStats,
}

/// Borrowed view of one block's adjacency.
#[derive(Clone, Copy)]
struct BlockView<'a> {
    block_id: u64,
    keys: &'a [GlobalKey],
    row_major: &'a Graph,
    col_major: &'a Graph,
}

/// Per-worker partitioning state, reused across blocks.
pub struct PartitionEngine<C> {
    channel: C,
    num_partitions: usize,
    cost_cache_limit: u32,
    neighbor_sets: NeighborSetTracker,
    costs: Vec<CostTracker>,
    assigned: BitSet,
    /// `(key, partition)` pairs added during the current block.
    added: Vec<(GlobalKey, PartitionId)>,
    pending: Vec<PushHandle>,
    blocks_done: u64,
}

impl<C: SyncChannel> PartitionEngine<C> {
    /// Creates an engine that synchronizes through `channel`.
    pub fn new(channel: C, config: &PartitionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            channel,
            num_partitions: config.num_partitions,
            cost_cache_limit: config.cost_cache_limit,
            neighbor_sets: NeighborSetTracker::new(config.neighbor_set),
            costs: (0..config.num_partitions).map(|_| CostTracker::new()).collect(),
            assigned: BitSet::new(0),
            added: Vec::new(),
            pending: Vec::new(),
            blocks_done: 0,
        })
    }

    /// Synchronization channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Number of partitions K.
    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Blocks partitioned so far.
    pub fn blocks_done(&self) -> u64 {
        self.blocks_done
    }

    /// Pushes issued but not yet acknowledged.
    pub fn pending_pushes(&self) -> usize {
        self.pending.len()
    }

    /// Neighbor sets as left by the last block.
    pub fn neighbor_sets(&self) -> &NeighborSetTracker {
        &self.neighbor_sets
    }

    /// Waits for the block's pull and partitions it.
    pub fn partition_block<E>(&mut self, block: BlockData<E>) -> Result<PartitionedBlock<E>> {
        let BlockData {
            block_id,
            keys,
            row_major,
            col_major,
            examples,
            pull,
        } = block;

        if examples.len() != row_major.rows() {
            return Err(PartitionError::malformed(
                block_id,
                format!("{} examples for {} rows", examples.len(), row_major.rows()),
            ));
        }
        debug!(block_id, "waiting for pull");
        let masks = pull.wait()?;

        let view = BlockView {
            block_id,
            keys: &keys,
            row_major: &row_major,
            col_major: &col_major,
        };
        let (assignment, stats) = self.partition_view(view, &masks)?;
        Ok(PartitionedBlock {
            examples,
            assignment,
            stats,
        })
    }

    /// Partitions a block whose masks are already known. `masks[c]` is the mask of `keys[c]`.
    ///
    /// `col_major` must equal `row_major.to_col_major()`; anything else is a
    /// [`PartitionError::MalformedBlock`].
    pub fn partition_graph(
        &mut self,
        block_id: u64,
        keys: &[GlobalKey],
        row_major: &Graph,
        col_major: &Graph,
        masks: &[PartitionMask],
    ) -> Result<(Vec<PartitionId>, BlockStats)> {
        let view = BlockView {
            block_id,
            keys,
            row_major,
            col_major,
        };
        self.partition_view(view, masks)
    }

    fn partition_view(
        &mut self,
        block: BlockView<'_>,
        masks: &[PartitionMask],
    ) -> Result<(Vec<PartitionId>, BlockStats)> {
        Self::check_block(block, masks)?;

        self.init_neighbor_set(block.keys, masks);
        self.init_cost(block);
        let assignment = self.assign(block);
        let added_replicas = self.added.len();
        let pushed_keys = self.send_updated_neighbor_set(block.block_id);
        self.reap_pushes()?;

        self.blocks_done += 1;
        let stats = BlockStats {
            block_id: block.block_id,
            rows: block.row_major.rows(),
            keys: block.keys.len(),
            added_replicas,
            pushed_keys,
        };
        info!(
            block_id = stats.block_id,
            rows = stats.rows,
            keys = stats.keys,
            added = stats.added_replicas,
            blocks_done = self.blocks_done,
            "partitioned block"
        );
        Ok((assignment, stats))
    }

    fn check_block(block: BlockView<'_>, masks: &[PartitionMask]) -> Result<()> {
        let malformed = |reason: String| Err(PartitionError::malformed(block.block_id, reason));
        let (rows, cols) = (block.row_major, block.col_major);
        if rows.cols() != block.keys.len() {
            return malformed(format!(
                "row-major view has {} columns for {} keys",
                rows.cols(),
                block.keys.len()
            ));
        }
        if cols.rows() != rows.cols() || cols.cols() != rows.rows() || cols.nnz() != rows.nnz() {
            return malformed(format!(
                "column-major view is {}x{} with {} entries, expected the transpose of {}x{} with {}",
                cols.rows(),
                cols.cols(),
                cols.nnz(),
                rows.rows(),
                rows.cols(),
                rows.nnz()
            ));
        }
        // Column lists must hold their U-vertices in increasing order, as `Graph::to_col_major`
        // produces them; walking the rows in order then meets each column entry exactly once.
        let mut seen = vec![0usize; rows.cols()];
        for u in 0..rows.rows() {
            for &c in rows.neighbors(u) {
                let c = c as usize;
                if cols.neighbors(c).get(seen[c]).map(|&v| v as usize) != Some(u) {
                    return malformed(format!(
                        "column-major view is not the transpose of the row-major view at column {c}"
                    ));
                }
                seen[c] += 1;
            }
        }
        if masks.len() != block.keys.len() {
            return malformed(format!(
                "pull returned {} masks for {} keys",
                masks.len(),
                block.keys.len()
            ));
        }
        if u32::try_from(rows.rows()).is_err() {
            return malformed(format!("{} rows exceed the local index range", rows.rows()));
        }
        Ok(())
    }

    fn init_neighbor_set(&mut self, keys: &[GlobalKey], masks: &[PartitionMask]) {
        self.neighbor_sets.rebuild(self.num_partitions, keys, masks);
    }

    /// Cost of U-vertex `u` in partition `k`: neighbors of `u` absent from partition `k`.
    #[allow(clippy::cast_possible_truncation)]
    fn partition_costs(
        neighbor_sets: &NeighborSetTracker,
        block: BlockView<'_>,
        partition: PartitionId,
    ) -> Vec<u32> {
        (0..block.row_major.rows())
            .map(|u| {
                block
                    .row_major
                    .neighbors(u)
                    .iter()
                    .filter(|&&c| !neighbor_sets.contains(partition, block.keys[c as usize]))
                    .count() as u32
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    #[allow(clippy::cast_possible_truncation)]
    fn init_cost(&mut self, block: BlockView<'_>) {
        let Self {
            neighbor_sets,
            costs,
            cost_cache_limit,
            ..
        } = self;
        for (k, tracker) in costs.iter_mut().enumerate() {
            let initial = Self::partition_costs(neighbor_sets, block, k as PartitionId);
            tracker.init(&initial, *cost_cache_limit);
        }
        self.assigned.reset(block.row_major.rows());
        debug!(block_id = block.block_id, partitions = self.num_partitions, "costs initialized");
    }

    #[cfg(feature = "parallel")]
    #[allow(clippy::cast_possible_truncation)]
    fn init_cost(&mut self, block: BlockView<'_>) {
        use rayon::prelude::*;

        let Self {
            neighbor_sets,
            costs,
            cost_cache_limit,
            ..
        } = self;
        let neighbor_sets = &*neighbor_sets;
        let limit = *cost_cache_limit;
        costs.par_iter_mut().enumerate().for_each(|(k, tracker)| {
            let initial = Self::partition_costs(neighbor_sets, block, k as PartitionId);
            tracker.init(&initial, limit);
        });
        self.assigned.reset(block.row_major.rows());
        debug!(block_id = block.block_id, partitions = self.num_partitions, "costs initialized");
    }

    #[allow(clippy::cast_possible_truncation)]
    fn assign(&mut self, block: BlockView<'_>) -> Vec<PartitionId> {
        let n = block.row_major.rows();
        let mut assignment = vec![0; n];
        for i in 0..n {
            let k = (i % self.num_partitions) as PartitionId;
            let Some(ui) = self.costs[k as usize].min_index() else {
                unreachable!("tracker {k} ran out of vertices at round {i} of {n}");
            };
            self.assigned.insert(ui);
            assignment[ui] = k;
            for tracker in &mut self.costs {
                tracker.remove(ui);
            }
            self.update_cost_and_neighbor_set(block, ui, k);
        }
        assignment
    }

    /// Adds the neighbors of `ui` missing from partition `k` and lowers the cost of every
    /// unassigned vertex that shares one of them.
    fn update_cost_and_neighbor_set(&mut self, block: BlockView<'_>, ui: usize, k: PartitionId) {
        let tracker = &mut self.costs[k as usize];
        for &c in block.row_major.neighbors(ui) {
            let key = block.keys[c as usize];
            if self.neighbor_sets.contains(k, key) {
                continue;
            }
            self.neighbor_sets.insert(k, key);
            self.added.push((key, k));
            for &u in block.col_major.neighbors(c as usize) {
                let u = u as usize;
                if !self.assigned.contains(u) {
                    tracker.decr_and_reorder(u);
                }
            }
        }
    }

    /// Pushes the OR of the added bits per key. Returns the number of keys pushed; nothing is
    /// sent for an empty delta.
    fn send_updated_neighbor_set(&mut self, block_id: u64) -> usize {
        if self.added.is_empty() {
            debug!(block_id, "no new replicas, skipping push");
            return 0;
        }
        self.added.sort_unstable_by_key(|&(key, _)| key);

        let mut keys: Vec<GlobalKey> = Vec::new();
        let mut values: Vec<PartitionMask> = Vec::new();
        for &(key, partition) in &self.added {
            match (keys.last(), values.last_mut()) {
                (Some(&last), Some(mask)) if last == key => mask.insert(partition),
                _ => {
                    keys.push(key);
                    values.push(PartitionMask::single(partition));
                }
            }
        }
        self.added.clear();

        let pushed = keys.len();
        debug!(block_id, keys = pushed, "pushing neighbor set delta");
        let handle = self.channel.push(
            block_id,
            PushRequest {
                keys,
                values,
                op: MergeOp::Or,
                cache: CacheHint::ClearWhenDone,
            },
        );
        self.pending.push(handle);
        pushed
    }

    /// Drops acknowledged pushes; fails on the first push the transport rejected.
    fn reap_pushes(&mut self) -> Result<()> {
        let mut failure = None;
        self.pending.retain_mut(|handle| match handle.try_wait() {
            None => true,
            Some(Ok(())) => false,
            Some(Err(err)) => {
                failure.get_or_insert(err);
                false
            }
        });
        failure.map_or(Ok(()), Err)
    }

    /// Waits for every outstanding push.
    pub fn finish(&mut self) -> Result<()> {
        debug!(pending = self.pending.len(), "flushing pushes");
        let mut first_error = None;
        for handle in self.pending.drain(..) {
            if let Err(err) = handle.wait() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
