//! Maps the global V-keys of a raw block onto dense local column ids.

use super::csr::{Graph, GraphError};
use crate::sync::GlobalKey;

/// A block whose adjacency refers to positions in its own sorted key list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedBlock {
    /// Sorted unique V-keys referenced by the block; column `c` is `keys[c]`.
    pub keys: Vec<GlobalKey>,
    /// Row `i` lists the local columns of example `i`, sorted, without duplicates.
    pub row_major: Graph,
}

/// Collects the unique keys of `rows` and remaps every row onto them.
///
/// Row `i` of the result is example `i`; a key repeated within one example is kept once.
#[allow(clippy::cast_possible_truncation)]
pub fn localize<R: AsRef<[GlobalKey]>>(rows: &[R]) -> Result<LocalizedBlock, GraphError> {
    let mut keys: Vec<GlobalKey> = rows.iter().flat_map(|r| r.as_ref().iter().copied()).collect();
    keys.sort_unstable();
    keys.dedup();
    if u32::try_from(keys.len()).is_err() {
        return Err(GraphError::TooManyColumns(keys.len()));
    }

    let mut offsets = Vec::with_capacity(rows.len() + 1);
    offsets.push(0);
    let mut indices = Vec::new();
    for row in rows {
        let start = indices.len();
        // Every key of the row is in `keys` by construction.
        indices.extend(
            row.as_ref()
                .iter()
                .filter_map(|key| keys.binary_search(key).ok())
                .map(|pos| pos as u32),
        );
        let local = &mut indices[start..];
        local.sort_unstable();
        let unique = dedup_sorted(local);
        indices.truncate(start + unique);
        offsets.push(indices.len());
    }

    let row_major = Graph::from_parts(offsets, indices, keys.len())?;
    Ok(LocalizedBlock { keys, row_major })
}

/// Moves the distinct values of a sorted slice to its front; returns their count.
fn dedup_sorted(values: &mut [u32]) -> usize {
    if values.is_empty() {
        return 0;
    }
    let mut write = 1;
    for read in 1..values.len() {
        if values[read] != values[write - 1] {
            values[write] = values[read];
            write += 1;
        }
    }
    write
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localize_sorts_keys_and_remaps_rows() {
        let rows = vec![vec![900u64, 5], vec![5, 5, 42], vec![]];
        let block = localize(&rows).unwrap();
        assert_eq!(block.keys, vec![5, 42, 900]);
        assert_eq!(block.row_major.rows(), 3);
        assert_eq!(block.row_major.neighbors(0), &[0, 2]);
        assert_eq!(block.row_major.neighbors(1), &[0, 1]);
        assert!(block.row_major.neighbors(2).is_empty());
    }

    #[test]
    fn test_localize_empty_block() {
        let rows: Vec<Vec<GlobalKey>> = Vec::new();
        let block = localize(&rows).unwrap();
        assert!(block.keys.is_empty());
        assert_eq!(block.row_major.rows(), 0);
    }

    #[test]
    fn test_dedup_sorted() {
        let mut values = [1, 1, 2, 3, 3, 3];
        assert_eq!(dedup_sorted(&mut values), 3);
        assert_eq!(&values[..3], &[1, 2, 3]);
    }
}
