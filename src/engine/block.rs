//! A block ready for partitioning.

use crate::graph::{Graph, LocalizedBlock};
use crate::sync::{CacheHint, GlobalKey, PullHandle, SyncChannel};

/// One block of the stream: both adjacency views, its examples, and the in-flight pull of the
/// partition masks of its keys.
#[derive(Debug)]
pub struct BlockData<E> {
    /// Position in the stream; also the synchronization channel id.
    pub block_id: u64,
    /// Sorted unique V-keys; local column `c` is `keys[c]`.
    pub keys: Vec<GlobalKey>,
    /// U-vertex -> local V-columns.
    pub row_major: Graph,
    /// Local V-column -> U-vertices; the transpose of `row_major`.
    pub col_major: Graph,
    /// Example `i` is U-vertex `i`.
    pub examples: Vec<E>,
    /// Masks of `keys`, in order.
    pub pull: PullHandle,
}

impl<E> BlockData<E> {
    /// Derives the column-major view and issues the pull for the block's keys on `channel`.
    ///
    /// The pull is tagged with `block_id` and asks the transport to keep the key list cached
    /// until the block's push.
    pub fn issue<C: SyncChannel + ?Sized>(
        channel: &C,
        block_id: u64,
        localized: LocalizedBlock,
        examples: Vec<E>,
    ) -> Self {
        let LocalizedBlock { keys, row_major } = localized;
        let pull = channel.pull(block_id, &keys, CacheHint::KeepCached);
        let col_major = row_major.to_col_major();
        Self {
            block_id,
            keys,
            row_major,
            col_major,
            examples,
            pull,
        }
    }

    /// Number of U-vertices.
    pub fn rows(&self) -> usize {
        self.row_major.rows()
    }

    /// Bytes this block holds while queued: both views, the keys and the example slots.
    pub fn memory_bytes(&self) -> usize {
        self.row_major.memory_bytes()
            + self.col_major.memory_bytes()
            + self.keys.capacity() * std::mem::size_of::<GlobalKey>()
            + self.examples.capacity() * std::mem::size_of::<E>()
    }
}
