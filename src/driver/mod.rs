//! `BlockPipelineDriver`: runs a whole stream through the engine.
//!
//! Three stages run concurrently:
//! - the reader pipeline's producer decodes the next block, localizes its keys, derives the
//!   column-major view and issues the block's pull,
//! - the calling thread partitions blocks one at a time,
//! - the writer pipeline's consumer appends each partitioned example to its partition's sink.
//!
//! Reading block N+1 (and the network round trip of its pull) overlaps partitioning block N, and
//! writing block N-1 overlaps both. A failure anywhere aborts both pipelines and is returned from
//! [`BlockPipelineDriver::run`].

mod sink;
mod source;

pub use sink::{JsonLinesSink, MemorySink, PartitionSink};
pub use source::{BlockSource, IterSource, RawBlock};

use crate::config::PartitionConfig;
use crate::engine::{BlockData, BlockStats, PartitionEngine};
use crate::error::{PartitionError, Result};
use crate::graph::localize;
use crate::pipeline::BoundedPipeline;
use crate::sync::{PartitionId, RetryChannel, SyncChannel};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Totals of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Blocks partitioned.
    pub blocks: u64,
    /// Examples partitioned.
    pub examples: usize,
    /// Examples written to each partition.
    pub partition_sizes: Vec<usize>,
    /// `(key, partition)` replicas added across all blocks.
    pub added_replicas: usize,
    /// Keys pushed across all blocks.
    pub pushed_keys: usize,
}

impl RunSummary {
    fn new(num_partitions: usize) -> Self {
        Self {
            partition_sizes: vec![0; num_partitions],
            ..Self::default()
        }
    }

    fn record(&mut self, stats: &BlockStats, assignment: &[PartitionId]) {
        self.blocks += 1;
        self.examples += stats.rows;
        self.added_replicas += stats.added_replicas;
        self.pushed_keys += stats.pushed_keys;
        for &k in assignment {
            self.partition_sizes[k as usize] += 1;
        }
    }
}

type Written<E> = (Vec<E>, Vec<PartitionId>);

/// Wires the reader and writer pipelines around a [`PartitionEngine`].
pub struct BlockPipelineDriver {
    config: PartitionConfig,
    channel: Arc<dyn SyncChannel>,
}

impl BlockPipelineDriver {
    /// Creates a driver synchronizing through `channel`, wrapped in a [`RetryChannel`] when
    /// `config.sync_retries` is non-zero.
    pub fn new<C: SyncChannel + 'static>(channel: C, config: PartitionConfig) -> Result<Self> {
        config.validate()?;
        let channel: Arc<dyn SyncChannel> = if config.sync_retries > 0 {
            Arc::new(RetryChannel::new(channel, config.sync_retries))
        } else {
            Arc::new(channel)
        };
        Ok(Self { config, channel })
    }

    /// Configuration in use.
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Partitions every block of `source` and writes the examples to `sink`.
    pub fn run<E, B, S>(&self, source: B, sink: S) -> anyhow::Result<RunSummary>
    where
        E: Send + 'static,
        B: BlockSource<E> + Send + 'static,
        S: PartitionSink<E> + Send + 'static,
    {
        let mut engine = PartitionEngine::new(Arc::clone(&self.channel), &self.config)?;
        let mut reader = self.start_reader(source);
        let sink = Arc::new(Mutex::new(sink));
        let mut writer = self.start_writer(Arc::clone(&sink));
        let mut summary = RunSummary::new(self.config.num_partitions);

        if let Err(err) = Self::partition_stream(&mut engine, &reader, &writer, &mut summary) {
            reader.abort();
            writer.abort();
            let reader_result = reader.join();
            let writer_result = writer.join();
            if is_abort(&err) {
                // Another stage tore the pipelines down; report what it hit.
                reader_result?;
                writer_result?;
            }
            return Err(err);
        }

        writer.set_finished();
        writer.wait_consumer().context("writing partitions")?;
        reader.join().context("reading blocks")?;
        engine.finish().context("flushing neighbor set updates")?;
        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        PartitionSink::<E>::finish(&mut *sink).context("finishing partition sink")?;

        info!(
            blocks = summary.blocks,
            examples = summary.examples,
            added = summary.added_replicas,
            "partitioning finished"
        );
        Ok(summary)
    }

    fn start_reader<E, B>(&self, mut source: B) -> BoundedPipeline<BlockData<E>, anyhow::Error>
    where
        E: Send + 'static,
        B: BlockSource<E> + Send + 'static,
    {
        let mut reader = BoundedPipeline::new("reader", self.config.data_buffer_bytes);
        let channel = Arc::clone(&self.channel);
        let block_size = self.config.block_size;
        let mut block_id = 0u64;
        reader.start_producer(move || {
            let raw = source
                .next_block(block_size)
                .with_context(|| format!("reading block {block_id}"))?;
            let Some(RawBlock { examples, keys }) = raw.filter(|raw| !raw.is_empty()) else {
                debug!(blocks = block_id, "input exhausted");
                return Ok(None);
            };
            if keys.len() != examples.len() {
                return Err(PartitionError::malformed(
                    block_id,
                    format!("{} examples but {} key lists", examples.len(), keys.len()),
                )
                .into());
            }
            let localized = localize(&keys)
                .map_err(|err| PartitionError::malformed(block_id, err.to_string()))?;
            let block = BlockData::issue(&*channel, block_id, localized, examples);
            debug!(block_id, rows = block.rows(), keys = block.keys.len(), "block read");
            block_id += 1;

            let bytes = block.memory_bytes();
            Ok(Some((block, bytes)))
        });
        reader
    }

    fn start_writer<E, S>(&self, sink: Arc<Mutex<S>>) -> BoundedPipeline<Written<E>, anyhow::Error>
    where
        E: Send + 'static,
        S: PartitionSink<E> + Send + 'static,
    {
        let mut writer = BoundedPipeline::new("writer", self.config.data_buffer_bytes);
        writer.start_consumer(move |(examples, assignment): Written<E>| {
            let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
            sink::write_block(&mut *sink, &examples, &assignment)
        });
        writer
    }

    fn partition_stream<E>(
        engine: &mut PartitionEngine<Arc<dyn SyncChannel>>,
        reader: &BoundedPipeline<BlockData<E>, anyhow::Error>,
        writer: &BoundedPipeline<Written<E>, anyhow::Error>,
        summary: &mut RunSummary,
    ) -> anyhow::Result<()>
    where
        E: Send + 'static,
    {
        while let Some(block) = reader.pop()? {
            let block_id = block.block_id;
            let partitioned = engine
                .partition_block(block)
                .with_context(|| format!("partitioning block {block_id}"))?;
            summary.record(&partitioned.stats, &partitioned.assignment);

            let bytes = partitioned.examples.capacity() * std::mem::size_of::<E>()
                + partitioned.assignment.capacity() * std::mem::size_of::<PartitionId>();
            writer.push((partitioned.examples, partitioned.assignment), bytes)?;
        }
        Ok(())
    }
}

fn is_abort(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<PartitionError>(), Some(PartitionError::Aborted))
}
