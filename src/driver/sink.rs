//! Where partitioned examples go.

use crate::sync::PartitionId;
use anyhow::{ensure, Context};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// One output stream per partition.
pub trait PartitionSink<E> {
    /// Appends `example` to the stream of `partition`.
    fn write(&mut self, partition: PartitionId, example: &E) -> anyhow::Result<()>;

    /// Flushes every stream. Called once after the last block.
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Appends a block's examples to their assigned partitions, in example order.
pub(crate) fn write_block<E, S>(sink: &mut S, examples: &[E], assignment: &[PartitionId]) -> anyhow::Result<()>
where
    S: PartitionSink<E> + ?Sized,
{
    ensure!(
        examples.len() == assignment.len(),
        "{} examples but {} partition assignments",
        examples.len(),
        assignment.len()
    );
    for (example, &partition) in examples.iter().zip(assignment) {
        sink.write(partition, example)?;
    }
    Ok(())
}

/// Keeps every partition in memory. Clones share the same storage.
#[derive(Debug)]
pub struct MemorySink<E> {
    partitions: Arc<Mutex<Vec<Vec<E>>>>,
}

impl<E> Clone for MemorySink<E> {
    fn clone(&self) -> Self {
        Self {
            partitions: Arc::clone(&self.partitions),
        }
    }
}

impl<E> MemorySink<E> {
    /// Creates `num_partitions` empty partitions.
    pub fn new(num_partitions: usize) -> Self {
        Self {
            partitions: Arc::new(Mutex::new((0..num_partitions).map(|_| Vec::new()).collect())),
        }
    }

    /// Number of examples per partition.
    pub fn sizes(&self) -> Vec<usize> {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Vec::len)
            .collect()
    }

    /// Copies out every partition.
    pub fn partitions(&self) -> Vec<Vec<E>>
    where
        E: Clone,
    {
        self.partitions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<E: Clone> PartitionSink<E> for MemorySink<E> {
    fn write(&mut self, partition: PartitionId, example: &E) -> anyhow::Result<()> {
        let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        let count = partitions.len();
        let target = partitions
            .get_mut(partition as usize)
            .with_context(|| format!("partition {partition} out of range for {count} partitions"))?;
        target.push(example.clone());
        Ok(())
    }
}

/// Writes partition `k` as JSON lines to `<prefix>_part_<k>.jsonl`.
#[derive(Debug)]
pub struct JsonLinesSink {
    paths: Vec<PathBuf>,
    writers: Vec<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Creates (truncating) one file per partition.
    pub fn create(prefix: impl AsRef<Path>, num_partitions: usize) -> anyhow::Result<Self> {
        let prefix = prefix.as_ref();
        let mut paths = Vec::with_capacity(num_partitions);
        let mut writers = Vec::with_capacity(num_partitions);
        for k in 0..num_partitions {
            let path = Self::partition_path(prefix, k);
            let file = File::create(&path)
                .with_context(|| format!("creating partition file {}", path.display()))?;
            writers.push(BufWriter::new(file));
            paths.push(path);
        }
        Ok(Self { paths, writers })
    }

    /// Output path of partition `k` for `prefix`.
    pub fn partition_path(prefix: &Path, k: usize) -> PathBuf {
        let mut name = prefix.as_os_str().to_owned();
        name.push(format!("_part_{k}.jsonl"));
        PathBuf::from(name)
    }

    /// Output paths, indexed by partition.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl<E: Serialize> PartitionSink<E> for JsonLinesSink {
    fn write(&mut self, partition: PartitionId, example: &E) -> anyhow::Result<()> {
        let count = self.writers.len();
        let writer = self
            .writers
            .get_mut(partition as usize)
            .with_context(|| format!("partition {partition} out of range for {count} partitions"))?;
        serde_json::to_writer(&mut *writer, example).context("encoding example")?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        for (writer, path) in self.writers.iter_mut().zip(&self.paths) {
            writer
                .flush()
                .with_context(|| format!("flushing {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_block_routes_examples() {
        let mut sink = MemorySink::new(3);
        write_block(&mut sink, &["a", "b", "c", "d"], &[2, 0, 2, 1]).unwrap();
        assert_eq!(sink.partitions(), vec![vec!["b"], vec!["d"], vec!["a", "c"]]);
    }

    #[test]
    fn test_write_block_rejects_length_mismatch() {
        let mut sink = MemorySink::new(2);
        let err = write_block(&mut sink, &[1, 2], &[0]).unwrap_err();
        assert!(err.to_string().contains("2 examples but 1"));
    }

    #[test]
    fn test_memory_sink_rejects_unknown_partition() {
        let mut sink = MemorySink::new(1);
        assert!(sink.write(1, &0u8).is_err());
    }

    #[test]
    fn test_partition_path() {
        let path = JsonLinesSink::partition_path(Path::new("/tmp/out/graph"), 3);
        assert_eq!(path, PathBuf::from("/tmp/out/graph_part_3.jsonl"));
    }
}
