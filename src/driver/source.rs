//! Where raw blocks come from.

use crate::sync::GlobalKey;

/// A block as decoded from the input: examples plus the V-keys each one references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawBlock<E> {
    /// Examples in stream order.
    pub examples: Vec<E>,
    /// `keys[i]` are the V-keys of `examples[i]`.
    pub keys: Vec<Vec<GlobalKey>>,
}

impl<E> RawBlock<E> {
    /// Number of examples.
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Returns `true` for a block without examples.
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Streaming decoder of the input graph.
pub trait BlockSource<E> {
    /// Reads up to `max_examples` examples. `Ok(None)` or an empty block ends the stream.
    fn next_block(&mut self, max_examples: usize) -> anyhow::Result<Option<RawBlock<E>>>;
}

/// Adapts any iterator of `(example, keys)` pairs into a [`BlockSource`].
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    /// Wraps `iter`.
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<E, I> BlockSource<E> for IterSource<I>
where
    I: Iterator<Item = (E, Vec<GlobalKey>)>,
{
    fn next_block(&mut self, max_examples: usize) -> anyhow::Result<Option<RawBlock<E>>> {
        let mut block = RawBlock {
            examples: Vec::new(),
            keys: Vec::new(),
        };
        for (example, keys) in self.iter.by_ref().take(max_examples) {
            block.examples.push(example);
            block.keys.push(keys);
        }
        Ok((!block.is_empty()).then_some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iter_source_chunks() {
        let mut source = IterSource::new((0..5u32).map(|i| (i, vec![u64::from(i)])));
        let sizes: Vec<usize> = std::iter::from_fn(|| source.next_block(2).unwrap())
            .map(|block| block.len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }
}
