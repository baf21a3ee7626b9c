//! Quantile-histogram tree grower.
//!
//! [`QuantileHistMaker`] owns the buffers that survive between trees (row
//! sets, histogram pool, samplers, worker pool). Every call to
//! [`QuantileHistMaker::grow_tree`] runs a short-lived `TreeBuilder` through
//! `Init -> RootReady -> Expanding -> Finalizing -> Done`:
//!
//! 1. `InitData`: check inputs, draw the row subsample, reset row sets,
//!    histogram pool and column sampler.
//! 2. `InitRoot`: build the root histogram and evaluate the root split.
//! 3. Expansion loop: pop a batch from the [`Driver`], apply the splits,
//!    partition rows, build the smaller child histogram and subtract the
//!    sibling, evaluate the children and queue them.
//! 4. `LeafPartition`: record the leaf of every row.
//!
//! Afterwards [`QuantileHistMaker::update_prediction_cache`] adds the new
//! tree's leaf values to a caller-owned prediction vector without walking
//! the tree again.

use crate::config::TrainParam;
use crate::core::constants::HIST_ROWS_PER_BLOCK;
use crate::core::error::{CacheMismatch, GrowerError, Result};
use crate::core::monitor::{scoped, Monitor, NoopMonitor};
use crate::core::types::{GradStats, GradientPair, NodeIndex, RowIndex, Score};
use crate::dataset::{MatrixId, QuantizedMatrix};
use crate::tree::histogram::{HistogramBuilder, HistogramPoolStatistics, SubtractionPlan};
use crate::tree::sampling::RowSampler;
use crate::tree::split::HistEvaluator;
use crate::tree::tree::RegTree;
use crate::treelearner::col_sampler::ColumnSampler;
use crate::treelearner::data_partition::{NodeSplit, RowPartitioner};
use crate::treelearner::driver::Driver;
use crate::treelearner::expand_entry::CpuExpandEntry;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Leaf reached by every row of the matrix a tree was grown on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePositions {
    leaf: Vec<NodeIndex>,
    sampled: Vec<bool>,
}

impl NodePositions {
    /// Leaf id of `row`.
    pub fn leaf(&self, row: RowIndex) -> NodeIndex {
        self.leaf[row as usize]
    }

    /// Whether `row` took part in growing the tree.
    pub fn is_sampled(&self, row: RowIndex) -> bool {
        self.sampled[row as usize]
    }

    /// Leaf id of every row.
    pub fn leaves(&self) -> &[NodeIndex] {
        &self.leaf
    }

    /// Whether each row was part of the row subsample.
    pub fn sampled(&self) -> &[bool] {
        &self.sampled
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.leaf.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.leaf.is_empty()
    }
}

/// Result of one growth pass.
#[derive(Debug, Clone)]
pub struct GrownTree {
    /// The grown tree
    pub tree: RegTree,
    /// Leaf of every row of the training matrix
    pub positions: NodePositions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Init,
    RootReady,
    Expanding,
    Finalizing,
    Done,
}

impl fmt::Display for BuilderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuilderState::Init => "Init",
            BuilderState::RootReady => "RootReady",
            BuilderState::Expanding => "Expanding",
            BuilderState::Finalizing => "Finalizing",
            BuilderState::Done => "Done",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct LastTree {
    matrix_id: MatrixId,
    positions: Vec<NodeIndex>,
    leaf_values: Vec<Score>,
}

/// Histogram-based tree grower.
#[derive(Debug)]
pub struct QuantileHistMaker {
    param: TrainParam,
    monitor: Arc<dyn Monitor>,
    thread_pool: rayon::ThreadPool,
    column_sampler: ColumnSampler,
    row_sampler: RowSampler,
    histogram_builder: HistogramBuilder,
    partitioner: RowPartitioner,
    last: Option<LastTree>,
}

impl QuantileHistMaker {
    /// Creates a grower that reports to no monitor.
    pub fn new(param: TrainParam) -> Result<Self> {
        Self::with_monitor(param, Arc::new(NoopMonitor))
    }

    /// Creates a grower reporting phase timings to `monitor`.
    pub fn with_monitor(param: TrainParam, monitor: Arc<dyn Monitor>) -> Result<Self> {
        param.validate()?;
        let num_threads = param.effective_num_threads();
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| GrowerError::threading(e.to_string()))?;
        log::debug!(
            "quantile histogram grower: {} threads, {} growth, max_depth {}",
            num_threads,
            param.grow_policy,
            param.max_depth
        );

        Ok(QuantileHistMaker {
            column_sampler: ColumnSampler::new(&param, param.seed.wrapping_add(1)),
            row_sampler: RowSampler::new(param.seed),
            histogram_builder: HistogramBuilder::new(),
            partitioner: RowPartitioner::new(),
            param,
            monitor,
            thread_pool,
            last: None,
        })
    }

    /// Training parameters.
    pub fn param(&self) -> &TrainParam {
        &self.param
    }

    /// Number of worker threads in the owned pool.
    pub fn num_threads(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Leaf per row of the last grown tree.
    pub fn last_positions(&self) -> Option<&[NodeIndex]> {
        self.last.as_ref().map(|last| last.positions.as_slice())
    }

    /// Usage statistics of the histogram buffer pool.
    pub fn pool_statistics(&self) -> HistogramPoolStatistics {
        self.histogram_builder.pool_statistics()
    }

    /// Grows one tree on `matrix` from per-row `gradients`.
    pub fn grow_tree(
        &mut self,
        gradients: &[GradientPair],
        matrix: &QuantizedMatrix,
    ) -> Result<GrownTree> {
        self.last = None;
        let QuantileHistMaker {
            param,
            monitor,
            thread_pool,
            column_sampler,
            row_sampler,
            histogram_builder,
            partitioner,
            ..
        } = self;
        let param: &TrainParam = param;

        let grown = thread_pool.install(|| {
            let mut builder = TreeBuilder {
                param,
                monitor: monitor.as_ref(),
                column_sampler,
                row_sampler,
                histograms: histogram_builder,
                partitioner,
                evaluator: HistEvaluator::new(param)?,
                state: BuilderState::Init,
            };
            builder.run(gradients, matrix)
        })?;

        self.last = Some(LastTree {
            matrix_id: matrix.id(),
            positions: grown.positions.leaf.clone(),
            leaf_values: grown.tree.leaf_values(),
        });
        Ok(grown)
    }

    /// Adds the last tree's leaf values to `predictions` in place.
    ///
    /// Only valid for the matrix the last tree was grown on; anything else
    /// is reported as a [`CacheMismatch`] and leaves `predictions` untouched.
    pub fn update_prediction_cache(
        &self,
        matrix: &QuantizedMatrix,
        predictions: &mut [Score],
    ) -> std::result::Result<(), CacheMismatch> {
        let last = self.last.as_ref().ok_or(CacheMismatch::NoTree)?;
        if last.matrix_id != matrix.id() {
            return Err(CacheMismatch::DifferentMatrix);
        }
        if predictions.len() != last.positions.len() {
            return Err(CacheMismatch::RowCount {
                expected: last.positions.len(),
                actual: predictions.len(),
            });
        }

        let _timer = scoped(self.monitor.as_ref(), "UpdatePredictionCache");
        self.thread_pool.install(|| {
            predictions
                .par_iter_mut()
                .zip(last.positions.par_iter())
                .for_each(|(prediction, &leaf)| *prediction += last.leaf_values[leaf]);
        });
        Ok(())
    }
}

/// State of one growth pass over borrowed grower buffers.
struct TreeBuilder<'a> {
    param: &'a TrainParam,
    monitor: &'a dyn Monitor,
    column_sampler: &'a mut ColumnSampler,
    row_sampler: &'a mut RowSampler,
    histograms: &'a mut HistogramBuilder,
    partitioner: &'a mut RowPartitioner,
    evaluator: HistEvaluator,
    state: BuilderState,
}

impl TreeBuilder<'_> {
    fn transition(&mut self, from: BuilderState, to: BuilderState) -> Result<()> {
        if self.state != from {
            return Err(GrowerError::internal(format!(
                "tree builder cannot move to {} from {}",
                to, self.state
            )));
        }
        log::trace!("tree builder: {} -> {}", from, to);
        self.state = to;
        Ok(())
    }

    fn run(&mut self, gradients: &[GradientPair], matrix: &QuantizedMatrix) -> Result<GrownTree> {
        self.init_data(gradients, matrix)?;

        let mut driver = Driver::new(self.param);
        let mut tree = self.init_root(gradients, matrix, &mut driver)?;
        self.transition(BuilderState::Init, BuilderState::RootReady)?;

        self.transition(BuilderState::RootReady, BuilderState::Expanding)?;
        self.expand_tree(&mut tree, &mut driver, gradients, matrix)?;
        self.histograms.release_all();

        self.transition(BuilderState::Expanding, BuilderState::Finalizing)?;
        let positions = self.leaf_partition(&tree, matrix)?;
        self.transition(BuilderState::Finalizing, BuilderState::Done)?;

        log::debug!(
            "grew tree: {} nodes, {} leaves, depth {}",
            tree.num_nodes(),
            tree.num_leaves(),
            tree.depth()
        );
        Ok(GrownTree { tree, positions })
    }

    fn init_data(&mut self, gradients: &[GradientPair], matrix: &QuantizedMatrix) -> Result<()> {
        let _timer = scoped(self.monitor, "InitData");
        if gradients.len() != matrix.num_rows() {
            return Err(GrowerError::dimension_mismatch(
                format!("{} gradient pairs", matrix.num_rows()),
                gradients.len().to_string(),
            ));
        }
        self.param.validate()?;
        self.param
            .validate_for_features(matrix.num_features(), matrix.max_num_bins())?;

        let rows = self
            .row_sampler
            .sample(matrix.num_rows(), self.param.subsample);
        self.partitioner.reset(&rows);

        self.column_sampler.init(matrix.num_features());
        self.histograms.reset(matrix, self.column_sampler.by_tree())?;
        Ok(())
    }

    fn init_root(
        &mut self,
        gradients: &[GradientPair],
        matrix: &QuantizedMatrix,
        driver: &mut Driver<CpuExpandEntry>,
    ) -> Result<RegTree> {
        let _timer = scoped(self.monitor, "InitRoot");
        let rows = self.partitioner.rows(0)?;
        let partial: Vec<GradStats> = rows
            .par_chunks(HIST_ROWS_PER_BLOCK)
            .map(|chunk| GradStats::from_rows(chunk, gradients))
            .collect();
        let root_stats = partial
            .into_iter()
            .fold(GradStats::default(), |acc, s| acc + s);

        {
            let _timer = scoped(self.monitor, "BuildHistogram");
            self.histograms.build_node(0, rows, matrix, gradients)?;
        }

        let tree = RegTree::with_root(self.evaluator.init_root(root_stats));
        let mut root = [CpuExpandEntry::new(0, 0)];
        let features = [self.column_sampler.by_node(0)];
        {
            let _timer = scoped(self.monitor, "EvaluateSplits");
            self.evaluator
                .evaluate_splits(&mut root, &features, &tree, &*self.histograms, matrix)?;
        }

        let [root] = root;
        if root.split.is_none() {
            log::debug!("root has no split reducing the loss");
        }
        driver.push(root);
        Ok(tree)
    }

    fn expand_tree(
        &mut self,
        tree: &mut RegTree,
        driver: &mut Driver<CpuExpandEntry>,
        gradients: &[GradientPair],
        matrix: &QuantizedMatrix,
    ) -> Result<()> {
        while !driver.is_empty() {
            let batch = driver.pop();
            if batch.is_empty() {
                continue;
            }

            let mut splits = Vec::with_capacity(batch.len());
            let mut expandable = Vec::with_capacity(batch.len());
            {
                let _timer = scoped(self.monitor, "ApplySplit");
                for entry in &batch {
                    let condition = match &entry.split {
                        Some(split) => split.condition(),
                        None => continue,
                    };
                    let (left, right) = self.evaluator.apply_tree_split(entry, tree)?;
                    splits.push(NodeSplit {
                        node: entry.nid,
                        left,
                        right,
                        condition,
                    });
                    if driver.is_child_valid(entry) {
                        expandable.push((entry.nid, entry.depth + 1, left, right));
                    } else {
                        self.histograms.release(entry.nid);
                    }
                }
            }

            {
                let _timer = scoped(self.monitor, "UpdatePosition");
                self.partitioner.update_position(&splits, matrix)?;
            }
            if expandable.is_empty() {
                continue;
            }

            {
                let _timer = scoped(self.monitor, "BuildHistogram");
                let partitioner = &*self.partitioner;
                let plans = expandable
                    .iter()
                    .map(|&(parent, _, left, right)| {
                        let (build, subtract) =
                            if partitioner.node_size(left) <= partitioner.node_size(right) {
                                (left, right)
                            } else {
                                (right, left)
                            };
                        partitioner.rows(build).map(|build_rows| SubtractionPlan {
                            parent,
                            build,
                            build_rows,
                            subtract,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.histograms.build_children(&plans, matrix, gradients)?;
            }

            let mut children: Vec<CpuExpandEntry> = expandable
                .iter()
                .flat_map(|&(_, depth, left, right)| {
                    [CpuExpandEntry::new(left, depth), CpuExpandEntry::new(right, depth)]
                })
                .collect();
            let feature_sets: Vec<_> = children
                .iter()
                .map(|child| self.column_sampler.by_node(child.depth))
                .collect();
            {
                let _timer = scoped(self.monitor, "EvaluateSplits");
                self.evaluator.evaluate_splits(
                    &mut children,
                    &feature_sets,
                    tree,
                    &*self.histograms,
                    matrix,
                )?;
            }

            for child in &children {
                if child.split.is_none() {
                    self.histograms.release(child.nid);
                }
            }
            driver.push_all(children);
        }
        Ok(())
    }

    fn leaf_partition(&self, tree: &RegTree, matrix: &QuantizedMatrix) -> Result<NodePositions> {
        let _timer = scoped(self.monitor, "LeafPartition");
        let num_rows = matrix.num_rows();
        let mut leaf = vec![0; num_rows];
        let mut sampled = vec![false; num_rows];

        let mut assigned = 0;
        for leaf_id in tree.leaf_indices() {
            for &row in self.partitioner.rows(leaf_id)? {
                let row = row as usize;
                if sampled[row] {
                    return Err(GrowerError::data_consistency(format!(
                        "row {} belongs to more than one leaf",
                        row
                    )));
                }
                sampled[row] = true;
                leaf[row] = leaf_id;
                assigned += 1;
            }
        }
        if assigned != self.partitioner.num_rows() {
            return Err(GrowerError::data_consistency(format!(
                "leaves hold {} rows but {} rows were sampled",
                assigned,
                self.partitioner.num_rows()
            )));
        }

        if assigned < num_rows {
            leaf.par_iter_mut()
                .zip(sampled.par_iter())
                .enumerate()
                .for_each(|(row, (position, &in_sample))| {
                    if !in_sample {
                        *position = tree.leaf_for_row(matrix, row as RowIndex);
                    }
                });
        }
        Ok(NodePositions { leaf, sampled })
    }
}
