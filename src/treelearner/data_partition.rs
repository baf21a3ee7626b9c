//! Row sets of the tree's nodes.
//!
//! All row indices live in one buffer. Every node owns a contiguous range of
//! it, and splitting a node reorders its range into a left run followed by a
//! right run, keeping the original order inside each run. The parent's range
//! stays recorded, so it still covers exactly its children's rows.

use crate::core::constants::PARTITION_BLOCK_SIZE;
use crate::core::error::{GrowerError, Result};
use crate::core::types::{NodeIndex, RowIndex};
use crate::dataset::QuantizedMatrix;
use crate::tree::node::SplitCondition;
use rayon::prelude::*;
use std::ops::Range;

/// Half-open range of the shared index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    /// First position in the index buffer
    pub begin: usize,
    /// One past the last position
    pub end: usize,
}

impl RowRange {
    /// Number of rows in the range.
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Whether the range holds no rows.
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    fn as_range(&self) -> Range<usize> {
        self.begin..self.end
    }
}

/// One split to apply to the row sets.
#[derive(Debug, Clone, Copy)]
pub struct NodeSplit {
    /// Node being split
    pub node: NodeIndex,
    /// Child receiving rows that go left
    pub left: NodeIndex,
    /// Child receiving the remaining rows
    pub right: NodeIndex,
    /// Routing rule of the split
    pub condition: SplitCondition,
}

/// RowPartitioner manages the partition of rows across tree nodes.
#[derive(Debug, Clone)]
pub struct RowPartitioner {
    /// Row indices ordered by node
    indices: Vec<RowIndex>,
    /// Destination buffer for partitioning, reused between splits
    scratch: Vec<RowIndex>,
    /// Range of every node id, `None` for ids not created yet
    ranges: Vec<Option<RowRange>>,
    block_size: usize,
}

impl Default for RowPartitioner {
    fn default() -> Self {
        Self::new()
    }
}

impl RowPartitioner {
    /// Creates an empty partitioner with the default block size.
    pub fn new() -> Self {
        Self::with_block_size(PARTITION_BLOCK_SIZE)
    }

    /// Creates a partitioner that counts and moves rows in blocks of `block_size`.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            indices: Vec::new(),
            scratch: Vec::new(),
            ranges: Vec::new(),
            block_size: block_size.max(1),
        }
    }

    /// Puts `rows` into the root node, dropping every other node.
    pub fn reset(&mut self, rows: &[RowIndex]) {
        self.indices.clear();
        self.indices.extend_from_slice(rows);
        self.ranges.clear();
        self.ranges.push(Some(RowRange {
            begin: 0,
            end: rows.len(),
        }));
    }

    /// Number of rows held by the root.
    pub fn num_rows(&self) -> usize {
        self.indices.len()
    }

    /// Range of `node` in the index buffer, if the node has rows.
    pub fn range(&self, node: NodeIndex) -> Option<RowRange> {
        self.ranges.get(node).copied().flatten()
    }

    /// Rows of `node`, in partition order.
    pub fn rows(&self, node: NodeIndex) -> Result<&[RowIndex]> {
        let range = self.range(node).ok_or_else(|| {
            GrowerError::data_consistency(format!("node {} has no row set", node))
        })?;
        Ok(&self.indices[range.as_range()])
    }

    /// Number of rows of `node`, `0` for unknown nodes.
    pub fn node_size(&self, node: NodeIndex) -> usize {
        self.range(node).map_or(0, |r| r.len())
    }

    /// Splits the rows of `node` into `left` and `right` by `condition`.
    ///
    /// Returns the sizes of the two children.
    pub fn partition(
        &mut self,
        node: NodeIndex,
        left: NodeIndex,
        right: NodeIndex,
        condition: &SplitCondition,
        matrix: &QuantizedMatrix,
    ) -> Result<(usize, usize)> {
        let range = self.range(node).ok_or_else(|| {
            GrowerError::data_consistency(format!("cannot partition node {} without rows", node))
        })?;
        if condition.feature >= matrix.num_features() {
            return Err(GrowerError::data_consistency(format!(
                "split feature {} out of range for {} features",
                condition.feature,
                matrix.num_features()
            )));
        }
        if left == node || right == node || left == right {
            return Err(GrowerError::internal(format!(
                "invalid children ({}, {}) for node {}",
                left, right, node
            )));
        }

        let column = matrix.column(condition.feature);
        let block_size = self.block_size;
        let len = range.len();

        let rows = &self.indices[range.as_range()];
        let left_counts: Vec<usize> = rows
            .par_chunks(block_size)
            .map(|block| {
                block
                    .iter()
                    .filter(|&&row| condition.goes_left(column.bin(row)))
                    .count()
            })
            .collect();
        let num_left: usize = left_counts.iter().sum();

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.resize(len, 0);
        {
            let (left_dst, right_dst) = scratch.split_at_mut(num_left);
            let mut left_slices = Vec::with_capacity(left_counts.len());
            let mut right_slices = Vec::with_capacity(left_counts.len());
            let mut left_rest = left_dst;
            let mut right_rest = right_dst;
            for (block, &count) in rows.chunks(block_size).zip(&left_counts) {
                let (l, rest) = std::mem::take(&mut left_rest).split_at_mut(count);
                left_slices.push(l);
                left_rest = rest;
                let (r, rest) = std::mem::take(&mut right_rest).split_at_mut(block.len() - count);
                right_slices.push(r);
                right_rest = rest;
            }

            rows.par_chunks(block_size)
                .zip(left_slices.into_par_iter())
                .zip(right_slices.into_par_iter())
                .for_each(|((block, l), r)| {
                    let (mut li, mut ri) = (0, 0);
                    for &row in block {
                        if condition.goes_left(column.bin(row)) {
                            l[li] = row;
                            li += 1;
                        } else {
                            r[ri] = row;
                            ri += 1;
                        }
                    }
                });
        }
        self.indices[range.as_range()].copy_from_slice(&scratch);
        self.scratch = scratch;

        let needed = left.max(right) + 1;
        if self.ranges.len() < needed {
            self.ranges.resize(needed, None);
        }
        self.ranges[left] = Some(RowRange {
            begin: range.begin,
            end: range.begin + num_left,
        });
        self.ranges[right] = Some(RowRange {
            begin: range.begin + num_left,
            end: range.end,
        });
        Ok((num_left, len - num_left))
    }

    /// Applies every split of one expansion batch, returning the child sizes.
    pub fn update_position(
        &mut self,
        splits: &[NodeSplit],
        matrix: &QuantizedMatrix,
    ) -> Result<Vec<(usize, usize)>> {
        splits
            .iter()
            .map(|s| self.partition(s.node, s.left, s.right, &s.condition, matrix))
            .collect()
    }
}
