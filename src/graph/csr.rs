//! Compressed sparse adjacency of one block.
//!
//! The same type stores both views of a block: row-major (U-vertex -> local V-columns) and
//! column-major (V-column -> U-rows), the latter being the transpose of the former.
//!
//! ### Performance Characteristics
//! | Operation | Complexity | Notes |
//! |-----------|------------|-------|
//! | `from_parts` | \(O(n + m)\) | validates offsets and indices |
//! | `neighbors` | \(O(1)\) | returns a slice |
//! | `to_col_major` | \(O(n + m + c)\) | counting transpose, stable by row |

use thiserror::Error;

/// Why raw CSR parts were rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// `offsets` must hold `rows + 1` entries starting at zero.
    #[error("offsets must start at 0 and hold rows + 1 entries")]
    MissingOffsets,
    /// Offsets decrease somewhere.
    #[error("offsets decrease at row {row}")]
    NonMonotoneOffsets {
        /// First row whose end precedes its start.
        row: usize,
    },
    /// The last offset disagrees with the index count.
    #[error("last offset {last} does not match {indices} indices")]
    LengthMismatch {
        /// Value of the last offset.
        last: usize,
        /// Length of the index array.
        indices: usize,
    },
    /// An index addresses a column outside the graph.
    #[error("index {index} out of bounds for {cols} columns")]
    IndexOutOfBounds {
        /// Offending index.
        index: u32,
        /// Column count.
        cols: usize,
    },
    /// The column count does not fit the `u32` index type.
    #[error("{0} columns exceed the u32 index range")]
    TooManyColumns(usize),
}

/// CSR adjacency with `rows()` rows over `cols()` columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    offsets: Vec<usize>,
    indices: Vec<u32>,
    cols: usize,
}

impl Default for Graph {
    fn default() -> Self {
        Self::empty(0)
    }
}

impl Graph {
    /// A graph with no rows over `cols` columns.
    pub fn empty(cols: usize) -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
            cols,
        }
    }

    /// Builds a graph from CSR parts, validating every invariant.
    pub fn from_parts(offsets: Vec<usize>, indices: Vec<u32>, cols: usize) -> Result<Self, GraphError> {
        if u32::try_from(cols).is_err() {
            return Err(GraphError::TooManyColumns(cols));
        }
        if offsets.first() != Some(&0) {
            return Err(GraphError::MissingOffsets);
        }
        if let Some(row) = offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(GraphError::NonMonotoneOffsets { row });
        }
        let last = offsets[offsets.len() - 1];
        if last != indices.len() {
            return Err(GraphError::LengthMismatch {
                last,
                indices: indices.len(),
            });
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= cols) {
            return Err(GraphError::IndexOutOfBounds { index, cols });
        }
        Ok(Self { offsets, indices, cols })
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Column indices of `row`.
    ///
    /// # Panics
    /// Panics if `row >= rows()`.
    #[inline]
    pub fn neighbors(&self, row: usize) -> &[u32] {
        &self.indices[self.offsets[row]..self.offsets[row + 1]]
    }

    /// Number of entries in `row`.
    #[inline]
    pub fn degree(&self, row: usize) -> usize {
        self.offsets[row + 1] - self.offsets[row]
    }

    /// Row pointer array.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Column index array.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Transpose: row `c` of the result lists, in increasing order, the rows of `self` holding
    /// column `c`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_col_major(&self) -> Graph {
        let mut counts = vec![0usize; self.cols];
        for &c in &self.indices {
            counts[c as usize] += 1;
        }

        let mut offsets = Vec::with_capacity(self.cols + 1);
        offsets.push(0);
        let mut total = 0usize;
        for &count in &counts {
            total += count;
            offsets.push(total);
        }

        // Stable: rows are scanned in increasing order.
        let mut write_pos = offsets[..self.cols].to_vec();
        let mut indices = vec![0u32; total];
        for row in 0..self.rows() {
            for &c in self.neighbors(row) {
                let pos = &mut write_pos[c as usize];
                indices[*pos] = row as u32;
                *pos += 1;
            }
        }

        Graph {
            offsets,
            indices,
            cols: self.rows(),
        }
    }

    /// Heap bytes held by both arrays.
    pub fn memory_bytes(&self) -> usize {
        self.offsets.capacity() * std::mem::size_of::<usize>()
            + self.indices.capacity() * std::mem::size_of::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Graph {
        // 0 -> {0, 2}, 1 -> {}, 2 -> {1, 2}
        Graph::from_parts(vec![0, 2, 2, 4], vec![0, 2, 1, 2], 3).unwrap()
    }

    #[test]
    fn test_accessors() {
        let g = sample();
        assert_eq!(g.rows(), 3);
        assert_eq!(g.cols(), 3);
        assert_eq!(g.nnz(), 4);
        assert_eq!(g.neighbors(0), &[0, 2]);
        assert!(g.neighbors(1).is_empty());
        assert_eq!(g.degree(2), 2);
    }

    #[test]
    fn test_transpose_is_stable_and_involutive() {
        let g = sample();
        let t = g.to_col_major();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.cols(), 3);
        assert_eq!(t.neighbors(0), &[0]);
        assert_eq!(t.neighbors(1), &[2]);
        assert_eq!(t.neighbors(2), &[0, 2]);
        assert_eq!(t.to_col_major(), g);
    }

    #[test]
    fn test_from_parts_rejects_inconsistent_parts() {
        assert_eq!(Graph::from_parts(vec![], vec![], 0), Err(GraphError::MissingOffsets));
        assert_eq!(
            Graph::from_parts(vec![0, 2, 1], vec![0, 0], 1),
            Err(GraphError::NonMonotoneOffsets { row: 1 })
        );
        assert_eq!(
            Graph::from_parts(vec![0, 1], vec![0, 0], 1),
            Err(GraphError::LengthMismatch { last: 1, indices: 2 })
        );
        assert_eq!(
            Graph::from_parts(vec![0, 1], vec![5], 2),
            Err(GraphError::IndexOutOfBounds { index: 5, cols: 2 })
        );
    }

    #[test]
    fn test_empty_graph() {
        let g = Graph::empty(4);
        assert_eq!(g.rows(), 0);
        let t = g.to_col_major();
        assert_eq!(t.rows(), 4);
        assert_eq!(t.nnz(), 0);
    }
}
