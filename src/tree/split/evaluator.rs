//! Best-split search over node histograms.
//!
//! For every allowed feature the evaluator scans the bins left to right,
//! accumulating the left child's statistics, and scores each threshold with
//! the missing values sent right and, when the feature has missing values in
//! the node, sent left. With missing values present the last bin is a
//! threshold too, separating every present value from the missing ones.
//! Features are scanned in parallel; the per-feature
//! winners are then reduced in feature order, so ties go to the lowest
//! feature, then the lowest bin, then missing-right.

use crate::config::TrainParam;
use crate::core::constants::K_RT_EPS;
use crate::core::error::{GrowerError, Result};
use crate::core::types::{BinIndex, FeatureIndex, GradStats, NodeIndex, Score};
use crate::dataset::QuantizedMatrix;
use crate::tree::histogram::{FeatureHistogram, HistogramBuilder};
use crate::tree::split::constraints::{ConstraintSet, MonotonicConstraint, WeightBounds};
use crate::tree::split::finder::{SplitEntry, SplitScorer};
use crate::tree::tree::{LeafInit, RegTree};
use crate::treelearner::expand_entry::CpuExpandEntry;
use rayon::prelude::*;

/// Split evaluator for histogram-based growth.
#[derive(Debug, Clone)]
pub struct HistEvaluator {
    scorer: SplitScorer,
    min_child_weight: f64,
    min_split_loss: f64,
    learning_rate: f64,
    constraints: ConstraintSet,
    /// Weight bounds per node id, only tightened by monotone splits
    bounds: Vec<WeightBounds>,
}

impl HistEvaluator {
    /// Creates an evaluator from the training parameters.
    pub fn new(param: &TrainParam) -> Result<Self> {
        Ok(HistEvaluator {
            scorer: SplitScorer::from_param(param),
            min_child_weight: param.min_child_weight,
            min_split_loss: param.min_split_loss,
            learning_rate: param.learning_rate,
            constraints: ConstraintSet::from_param(param)?,
            bounds: vec![WeightBounds::unbounded()],
        })
    }

    /// Constraints applied to every candidate.
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Weight and score formulas.
    pub fn scorer(&self) -> &SplitScorer {
        &self.scorer
    }

    /// Weight bounds currently attached to `node`.
    pub fn node_bounds(&self, node: NodeIndex) -> WeightBounds {
        self.bounds.get(node).copied().unwrap_or_default()
    }

    /// Unshrunk weight of `node` given its statistics.
    pub fn node_weight(&self, node: NodeIndex, stats: GradStats) -> f64 {
        self.node_bounds(node).clamp(self.scorer.weight(stats))
    }

    fn leaf_init(&self, stats: GradStats, weight: f64) -> LeafInit {
        LeafInit {
            stats,
            base_weight: weight,
            leaf_value: (weight * self.learning_rate) as Score,
        }
    }

    /// Resets per-tree state and computes the root leaf.
    pub fn init_root(&mut self, root_stats: GradStats) -> LeafInit {
        self.bounds.clear();
        self.bounds.push(WeightBounds::unbounded());
        let weight = self.node_weight(0, root_stats);
        self.leaf_init(root_stats, weight)
    }

    fn node_score(&self, stats: GradStats, bounds: WeightBounds) -> f64 {
        if self.constraints.has_monotone() {
            let weight = bounds.clamp(self.scorer.weight(stats));
            self.scorer.score_given_weight(stats, weight)
        } else {
            self.scorer.score(stats)
        }
    }

    /// Gain of splitting into `left`/`right`, `-inf` when a monotone
    /// constraint on `feature` is violated.
    fn split_gain(
        &self,
        feature: FeatureIndex,
        left: GradStats,
        right: GradStats,
        parent_score: f64,
        bounds: WeightBounds,
    ) -> f64 {
        if !self.constraints.has_monotone() {
            let children = self.scorer.score(left) + self.scorer.score(right);
            return 0.5 * (children - parent_score) - self.min_split_loss;
        }

        let left_weight = bounds.clamp(self.scorer.weight(left));
        let right_weight = bounds.clamp(self.scorer.weight(right));
        let violated = match self.constraints.monotone(feature) {
            MonotonicConstraint::None => false,
            MonotonicConstraint::Increasing => left_weight > right_weight,
            MonotonicConstraint::Decreasing => left_weight < right_weight,
        };
        if violated {
            return f64::NEG_INFINITY;
        }
        let children = self.scorer.score_given_weight(left, left_weight)
            + self.scorer.score_given_weight(right, right_weight);
        0.5 * (children - parent_score) - self.min_split_loss
    }

    fn enumerate_feature(
        &self,
        feature: FeatureIndex,
        histogram: &FeatureHistogram<'_>,
        parent: GradStats,
        parent_score: f64,
        bounds: WeightBounds,
        matrix: &QuantizedMatrix,
    ) -> Option<SplitEntry> {
        let num_bins = histogram.bins.len();
        let has_missing = !histogram.missing.is_empty();
        // The last bin only separates present values from missing ones.
        let last = if has_missing { num_bins } else { num_bins.saturating_sub(1) };
        let directions: &[bool] = if has_missing { &[false, true] } else { &[false] };

        let mut best: Option<SplitEntry> = None;
        let mut left_acc = GradStats::default();
        for bin in 0..last {
            left_acc += histogram.bins[bin];
            let is_last = bin + 1 == num_bins;
            for &default_left in directions {
                if is_last && default_left {
                    continue;
                }
                let left = if default_left {
                    left_acc + histogram.missing
                } else {
                    left_acc
                };
                let right = parent - left;
                if left.sum_hess < self.min_child_weight || right.sum_hess < self.min_child_weight
                {
                    continue;
                }

                let gain = self.split_gain(feature, left, right, parent_score, bounds);
                if !gain.is_finite() {
                    continue;
                }
                let candidate = SplitEntry {
                    feature,
                    split_bin: bin as BinIndex,
                    threshold: if is_last {
                        f64::MAX
                    } else {
                        matrix.bin_upper_bound(feature, bin as BinIndex)
                    },
                    default_left,
                    gain,
                    left_sum: left,
                    right_sum: right,
                };
                if candidate.is_better_than(best.as_ref()) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Best split of one node over `features`, or `None` when no candidate
    /// reduces the loss.
    pub fn evaluate_node(
        &self,
        node: NodeIndex,
        stats: GradStats,
        features: &[FeatureIndex],
        path: &[FeatureIndex],
        histograms: &HistogramBuilder,
        matrix: &QuantizedMatrix,
    ) -> Result<Option<SplitEntry>> {
        let mut allowed = self.constraints.interactions().filter(features, path);
        allowed.sort_unstable();
        allowed.dedup();
        let bounds = self.node_bounds(node);
        let parent_score = self.node_score(stats, bounds);

        let feature_histograms = allowed
            .iter()
            .map(|&f| histograms.feature_histogram(node, f).map(|h| (f, h)))
            .collect::<Result<Vec<_>>>()?;

        let per_feature: Vec<Option<SplitEntry>> = feature_histograms
            .par_iter()
            .map(|(feature, histogram)| {
                self.enumerate_feature(*feature, histogram, stats, parent_score, bounds, matrix)
            })
            .collect();

        let mut best: Option<SplitEntry> = None;
        for candidate in per_feature.into_iter().flatten() {
            if candidate.is_better_than(best.as_ref()) {
                best = Some(candidate);
            }
        }
        Ok(best.filter(|entry| entry.gain > K_RT_EPS))
    }

    /// Fills in the best split of every entry. `feature_sets[i]` holds the
    /// features sampled for `entries[i]`.
    pub fn evaluate_splits(
        &self,
        entries: &mut [CpuExpandEntry],
        feature_sets: &[Vec<FeatureIndex>],
        tree: &RegTree,
        histograms: &HistogramBuilder,
        matrix: &QuantizedMatrix,
    ) -> Result<()> {
        if entries.len() != feature_sets.len() {
            return Err(GrowerError::dimension_mismatch(
                format!("{} feature sets", entries.len()),
                feature_sets.len().to_string(),
            ));
        }

        for (entry, features) in entries.iter_mut().zip(feature_sets) {
            let node = tree.node(entry.nid).ok_or_else(|| {
                GrowerError::data_consistency(format!("node {} is not in the tree", entry.nid))
            })?;
            let path = tree.branch_features(entry.nid);
            entry.split =
                self.evaluate_node(entry.nid, node.stats(), features, &path, histograms, matrix)?;
        }
        Ok(())
    }

    /// Applies the split of `entry` to `tree`, returning the new child ids.
    pub fn apply_tree_split(
        &mut self,
        entry: &CpuExpandEntry,
        tree: &mut RegTree,
    ) -> Result<(NodeIndex, NodeIndex)> {
        let split = entry.split.as_ref().ok_or_else(|| {
            GrowerError::internal(format!("node {} has no split to apply", entry.nid))
        })?;

        let bounds = self.node_bounds(entry.nid);
        let left_weight = bounds.clamp(self.scorer.weight(split.left_sum));
        let right_weight = bounds.clamp(self.scorer.weight(split.right_sum));
        let (left_bounds, right_bounds) = bounds.split(
            self.constraints.monotone(split.feature),
            left_weight,
            right_weight,
        );

        let (left, right) = tree.apply_split(
            entry.nid,
            split.condition(),
            split.gain,
            self.leaf_init(split.left_sum, left_weight),
            self.leaf_init(split.right_sum, right_weight),
        )?;

        if self.bounds.len() <= right {
            self.bounds.resize(right + 1, WeightBounds::unbounded());
        }
        self.bounds[left] = left_bounds;
        self.bounds[right] = right_bounds;
        Ok((left, right))
    }
}
