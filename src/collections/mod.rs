//! Data structures of the partitioning core.
//!
//! - `bit_set`: fixed-universe bit set
//! - `bloom_filter`: approximate membership
//! - `neighbor_set`: per-partition V-key membership
//! - `cost_tracker`: per-partition replication costs

pub mod bit_set;
pub mod bloom_filter;
pub mod cost_tracker;
pub mod neighbor_set;

pub use bit_set::BitSet;
pub use bloom_filter::BloomFilter;
pub use cost_tracker::CostTracker;
pub use neighbor_set::NeighborSetTracker;
