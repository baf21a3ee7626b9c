//! Histogram construction for split finding.
//!
//! A node histogram is built directly only for the smaller child of a split.
//! The sibling is derived as `parent - built`, which costs one pass over the
//! histogram slots instead of one pass over the sibling's rows.
//!
//! Rows are cut into blocks whose count depends only on the number of rows.
//! Each block is accumulated into its own buffer and the buffers are merged
//! pairwise in a fixed tree order, so results do not depend on how many
//! threads run the blocks.

use crate::core::constants::{HIST_ROWS_PER_BLOCK, MAX_HIST_BLOCKS};
use crate::core::error::{GrowerError, Result};
use crate::core::types::{FeatureIndex, GradStats, GradientPair, NodeIndex, RowIndex};
use crate::dataset::QuantizedMatrix;
use crate::tree::histogram::pool::{
    FeatureHistogram, HistogramLayout, HistogramPool, HistogramPoolStatistics, NodeHistogram,
};
use rayon::prelude::*;

/// One split whose child histograms are to be produced.
#[derive(Debug, Clone, Copy)]
pub struct SubtractionPlan<'a> {
    /// Node whose histogram is already live
    pub parent: NodeIndex,
    /// Child built directly from its rows
    pub build: NodeIndex,
    /// Rows of the `build` child
    pub build_rows: &'a [RowIndex],
    /// Child derived by subtraction
    pub subtract: NodeIndex,
}

/// Builds and owns the histograms of the nodes being expanded.
#[derive(Debug)]
pub struct HistogramBuilder {
    pool: HistogramPool,
    features: Vec<FeatureIndex>,
    in_set: Vec<bool>,
    rows_per_block: usize,
}

impl Default for HistogramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn block_count(num_rows: usize, rows_per_block: usize) -> usize {
    ((num_rows + rows_per_block - 1) / rows_per_block).clamp(1, MAX_HIST_BLOCKS)
}

fn accumulate_block(
    rows: &[RowIndex],
    matrix: &QuantizedMatrix,
    gradients: &[GradientPair],
    features: &[FeatureIndex],
    layout: &HistogramLayout,
    buffer: &mut [GradStats],
) {
    for &feature in features {
        let column = matrix.column(feature);
        let bins = &mut buffer[layout.bin_range(feature)];
        let mut missing = GradStats::default();
        for &row in rows {
            let pair = gradients[row as usize];
            match column.bin(row) {
                Some(bin) => bins[bin as usize].add_pair(pair),
                None => missing.add_pair(pair),
            }
        }
        buffer[layout.missing_slot(feature)] += missing;
    }
}

fn add_into(target: &mut [GradStats], source: &[GradStats]) {
    for (t, &s) in target.iter_mut().zip(source) {
        *t += s;
    }
}

/// Merges `buffers` into `buffers[0]` along a fixed binary tree.
fn reduce_pairwise(buffers: &mut [Vec<GradStats>]) {
    let mut stride = 1;
    while stride < buffers.len() {
        buffers.par_chunks_mut(2 * stride).for_each(|group| {
            if group.len() > stride {
                let (head, tail) = group.split_at_mut(stride);
                add_into(&mut head[0], &tail[0]);
            }
        });
        stride *= 2;
    }
}

impl HistogramBuilder {
    /// Creates a builder with the default block size.
    pub fn new() -> Self {
        Self::with_rows_per_block(HIST_ROWS_PER_BLOCK)
    }

    /// Creates a builder accumulating at most `rows_per_block` rows per block.
    pub fn with_rows_per_block(rows_per_block: usize) -> Self {
        HistogramBuilder {
            pool: HistogramPool::new(),
            features: Vec::new(),
            in_set: Vec::new(),
            rows_per_block: rows_per_block.max(1),
        }
    }

    /// Prepares for a new tree over `matrix`, accumulating only `features`.
    pub fn reset(&mut self, matrix: &QuantizedMatrix, features: &[FeatureIndex]) -> Result<()> {
        let num_features = matrix.num_features();
        if let Some(&bad) = features.iter().find(|&&f| f >= num_features) {
            return Err(GrowerError::data_consistency(format!(
                "sampled feature {} out of range for {} features",
                bad, num_features
            )));
        }

        self.pool.reset(HistogramLayout::new(matrix));
        self.features = features.to_vec();
        self.in_set = vec![false; num_features];
        for &feature in features {
            self.in_set[feature] = true;
        }
        Ok(())
    }

    /// Features accumulated into every histogram.
    pub fn sampled_features(&self) -> &[FeatureIndex] {
        &self.features
    }

    /// Layout shared by all node histograms.
    pub fn layout(&self) -> &HistogramLayout {
        self.pool.layout()
    }

    fn accumulate(
        &mut self,
        rows: &[RowIndex],
        matrix: &QuantizedMatrix,
        gradients: &[GradientPair],
    ) -> Vec<GradStats> {
        let num_blocks = block_count(rows.len(), self.rows_per_block);
        let mut buffers: Vec<Vec<GradStats>> =
            (0..num_blocks).map(|_| self.pool.acquire()).collect();
        let layout = self.pool.layout();
        let features = &self.features;

        if num_blocks == 1 {
            accumulate_block(rows, matrix, gradients, features, layout, &mut buffers[0]);
        } else {
            let block_len = (rows.len() + num_blocks - 1) / num_blocks;
            buffers
                .par_iter_mut()
                .zip(rows.par_chunks(block_len))
                .for_each(|(buffer, block)| {
                    accumulate_block(block, matrix, gradients, features, layout, buffer);
                });
            reduce_pairwise(&mut buffers);
        }

        let mut buffers = buffers.into_iter();
        let result = buffers.next().unwrap_or_default();
        for spare in buffers {
            self.pool.recycle(spare);
        }
        result
    }

    /// Builds the histogram of `node` directly from its rows.
    pub fn build_node(
        &mut self,
        node: NodeIndex,
        rows: &[RowIndex],
        matrix: &QuantizedMatrix,
        gradients: &[GradientPair],
    ) -> Result<()> {
        if self.layout().num_features() != matrix.num_features() {
            return Err(GrowerError::data_consistency(
                "histogram layout does not match the matrix",
            ));
        }
        let histogram = self.accumulate(rows, matrix, gradients);
        self.pool.insert(node, NodeHistogram::from_buffer(histogram));
        Ok(())
    }

    /// Produces both child histograms of every plan and frees the parents.
    pub fn build_children(
        &mut self,
        plans: &[SubtractionPlan<'_>],
        matrix: &QuantizedMatrix,
        gradients: &[GradientPair],
    ) -> Result<()> {
        for plan in plans {
            if !self.pool.contains(plan.parent) {
                return Err(GrowerError::data_consistency(format!(
                    "histogram of node {} is not available for subtraction",
                    plan.parent
                )));
            }

            let built = self.accumulate(plan.build_rows, matrix, gradients);
            let mut derived = self.pool.acquire();
            if let Some(parent) = self.pool.get(plan.parent) {
                derived
                    .par_iter_mut()
                    .zip(parent.as_slice().par_iter())
                    .zip(built.par_iter())
                    .for_each(|((out, &p), &b)| *out = p - b);
            }

            self.pool.insert(plan.build, NodeHistogram::from_buffer(built));
            self.pool
                .insert(plan.subtract, NodeHistogram::from_buffer(derived));
            self.pool.release(plan.parent);
        }
        Ok(())
    }

    /// Histogram of `node`.
    pub fn histogram(&self, node: NodeIndex) -> Result<&NodeHistogram> {
        self.pool.get(node).ok_or_else(|| {
            GrowerError::data_consistency(format!("no histogram for node {}", node))
        })
    }

    /// Histogram of one sampled feature of `node`.
    pub fn feature_histogram(
        &self,
        node: NodeIndex,
        feature: FeatureIndex,
    ) -> Result<FeatureHistogram<'_>> {
        if !self.in_set.get(feature).copied().unwrap_or(false) {
            return Err(GrowerError::data_consistency(format!(
                "feature {} is outside the sampled feature set",
                feature
            )));
        }
        Ok(self.histogram(node)?.feature(self.pool.layout(), feature))
    }

    /// Frees the histogram of `node`.
    pub fn release(&mut self, node: NodeIndex) {
        self.pool.release(node);
    }

    /// Frees every live histogram.
    pub fn release_all(&mut self) {
        self.pool.release_all();
    }

    /// Pool usage statistics.
    pub fn pool_statistics(&self) -> HistogramPoolStatistics {
        self.pool.statistics()
    }
}
