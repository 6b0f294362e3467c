//! # `parsa` - Streaming Vertex-Cut Partitioning Worker
//!
//! Assigns the U-side vertices of a bipartite graph, streamed in blocks, to `K` partitions
//! while keeping the replication of their V-side neighbors across partitions low. Workers
//! share what they have placed where through a key-value store of per-vertex partition masks
//! merged with bitwise OR.
//!
//! ## Key Features
//!
//! - **Greedy streaming assignment**: each round hands the next partition its cheapest
//!   unassigned vertex, so every partition receives an even share of every block
//! - **Bucketed cost tracking**: O(1) amortized minimum lookup and decrement per partition
//! - **Exact or approximate neighbor sets**: hash sets or Bloom filters, chosen at run time
//! - **Pipelined I/O and synchronization**: reading and pulling the next block and writing
//!   the previous one overlap partitioning of the current one
//!
//! ## Architecture
//!
//! 1. **Collections** ([`collections`]):
//!    - [`BitSet`], [`BloomFilter`]: storage primitives
//!    - [`NeighborSetTracker`]: "is V-key `v` present in partition `k`?"
//!    - [`CostTracker`]: per-partition replication cost of every unassigned vertex
//!
//! 2. **Graph** ([`graph`]):
//!    - [`Graph`]: CSR adjacency used for both the row-major and column-major view of a block
//!    - [`localize`]: maps global V-keys onto dense local columns
//!
//! 3. **Synchronization** ([`sync`]):
//!    - [`SyncChannel`]: asynchronous pull/push of [`PartitionMask`]s tagged by block id
//!    - [`InMemoryStore`], [`RetryChannel`]: a single-process store and a retrying wrapper
//!
//! 4. **Execution** ([`pipeline`], [`engine`], [`driver`]):
//!    - [`BoundedPipeline`]: byte-budgeted producer/consumer queue
//!    - [`PartitionEngine`]: partitions one block
//!    - [`BlockPipelineDriver`]: reader -> engine -> writer over a whole stream
//!
//! ## Example
//!
//! ```rust
//! use parsa::{BlockPipelineDriver, InMemoryStore, IterSource, MemorySink, PartitionConfig};
//!
//! let config = PartitionConfig {
//!     num_partitions: 2,
//!     block_size: 4,
//!     ..PartitionConfig::default()
//! };
//! // Eight examples; consecutive pairs share a V-key.
//! let examples = (0..8u64).map(|i| (i, vec![i / 2]));
//! let sink = MemorySink::new(2);
//!
//! let driver = BlockPipelineDriver::new(InMemoryStore::new(), config).unwrap();
//! let summary = driver.run(IterSource::new(examples), sink.clone()).unwrap();
//!
//! assert_eq!(summary.blocks, 2);
//! assert_eq!(summary.partition_sizes, vec![4, 4]);
//! assert_eq!(sink.sizes(), vec![4, 4]);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod collections;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod sync;

pub use collections::{BitSet, BloomFilter, CostTracker, NeighborSetTracker};
pub use config::{NeighborSetMode, PartitionConfig};
pub use driver::{
    BlockPipelineDriver, BlockSource, IterSource, JsonLinesSink, MemorySink, PartitionSink,
    RawBlock, RunSummary,
};
pub use engine::{BlockData, BlockStats, PartitionEngine, PartitionedBlock};
pub use error::{PartitionError, Result};
pub use graph::{localize, Graph, GraphError, LocalizedBlock};
pub use pipeline::BoundedPipeline;
pub use sync::{
    CacheHint, ChannelId, GlobalKey, InMemoryStore, MergeOp, PartitionId, PartitionMask,
    PushRequest, RetryChannel, SyncChannel, MAX_PARTITIONS,
};

// Compile-time layout checks.
const _: () = {
    use core::mem;

    // Masks travel as plain u64 words.
    assert!(mem::size_of::<PartitionMask>() == mem::size_of::<u64>());
    assert!(MAX_PARTITIONS == u64::BITS as usize);
};
