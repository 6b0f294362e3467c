//! Synchronization of partition membership with peer workers.
//!
//! The global state is a distributed key-value store keyed by [`GlobalKey`] whose values are
//! [`PartitionMask`]s. Workers pull the masks of the keys in a block before partitioning it and
//! push back the bits they added, merged with [`MergeOp::Or`]. OR-merge is associative,
//! commutative and idempotent, so pushes from different workers may interleave, repeat or be
//! reordered without locking.
//!
//! Requests are tagged with a [`ChannelId`] (the block id), so several blocks can be in flight at
//! once, each tracked by its own [`Handle`].

pub mod handle;
pub mod memory;
pub mod retry;

pub use handle::{completion, Completer, Handle, PullHandle, PushHandle};
pub use memory::InMemoryStore;
pub use retry::RetryChannel;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Process-wide identifier of a V-vertex, stable across blocks and workers.
pub type GlobalKey = u64;

/// Partition index in `0..num_partitions`.
pub type PartitionId = u32;

/// Tag correlating a pull with its later push; the block id.
pub type ChannelId = u64;

/// Widest partition count a [`PartitionMask`] can represent.
pub const MAX_PARTITIONS: usize = 64;

/// Bit `k` is set iff the V-vertex is present in partition `k`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionMask(u64);

impl PartitionMask {
    /// No partition.
    pub const EMPTY: Self = Self(0);

    /// Wraps raw bits.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Mask with only `partition` set.
    ///
    /// # Panics
    /// Panics if `partition >= MAX_PARTITIONS`.
    #[inline]
    pub fn single(partition: PartitionId) -> Self {
        assert!(
            (partition as usize) < MAX_PARTITIONS,
            "partition {partition} exceeds mask width {MAX_PARTITIONS}"
        );
        Self(1 << partition)
    }

    /// Sets `partition`.
    #[inline]
    pub fn insert(&mut self, partition: PartitionId) {
        *self |= Self::single(partition);
    }

    /// Returns `true` if `partition` is set.
    #[inline]
    pub fn contains(self, partition: PartitionId) -> bool {
        (partition as usize) < MAX_PARTITIONS && self.0 & (1 << partition) != 0
    }

    /// Returns `true` if no partition is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of partitions set (replication factor of the vertex).
    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the set partitions in increasing order.
    pub fn iter(self) -> impl Iterator<Item = PartitionId> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let p = rest.trailing_zeros();
            rest &= rest - 1;
            Some(p)
        })
    }
}

impl BitOr for PartitionMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PartitionMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PartitionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionMask({:#b})", self.0)
    }
}

/// How a pushed value combines with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeOp {
    /// Bitwise OR; the partition-membership operator.
    Or,
    /// Overwrite; used to seed state.
    Assign,
}

impl MergeOp {
    /// Combines `stored` with `update`.
    #[inline]
    pub fn apply(self, stored: PartitionMask, update: PartitionMask) -> PartitionMask {
        match self {
            MergeOp::Or => stored | update,
            MergeOp::Assign => update,
        }
    }
}

/// Transport hint for caching a request's key list across the pull/push round of a channel.
///
/// Affects efficiency only, never results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CacheHint {
    /// No caching.
    #[default]
    None,
    /// Remember the key list under the channel id.
    KeepCached,
    /// Use the cached key list, then evict it once the request completes.
    ClearWhenDone,
}

/// Values to merge into the global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Keys to update, strictly increasing.
    pub keys: Vec<GlobalKey>,
    /// One value per key.
    pub values: Vec<PartitionMask>,
    /// Merge operator.
    pub op: MergeOp,
    /// Caching hint.
    pub cache: CacheHint,
}

/// Pull/push access to the distributed partition-membership store.
pub trait SyncChannel: Send + Sync {
    /// Issues an asynchronous fetch of the current masks of `keys`.
    fn pull(&self, channel: ChannelId, keys: &[GlobalKey], cache: CacheHint) -> PullHandle;

    /// Asynchronously merges `request` into the global state.
    fn push(&self, channel: ChannelId, request: PushRequest) -> PushHandle;
}

impl<C: SyncChannel + ?Sized> SyncChannel for Arc<C> {
    fn pull(&self, channel: ChannelId, keys: &[GlobalKey], cache: CacheHint) -> PullHandle {
        (**self).pull(channel, keys, cache)
    }

    fn push(&self, channel: ChannelId, request: PushRequest) -> PushHandle {
        (**self).push(channel, request)
    }
}
