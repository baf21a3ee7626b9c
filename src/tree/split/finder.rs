//! Split candidates and the second-order gain and weight formulas.
//!
//! For gradient sum `G` and hessian sum `H` of a node, with L2 penalty
//! `lambda` and L1 penalty `alpha`:
//!
//! - `T(G) = sign(G) * max(|G| - alpha, 0)`
//! - optimal weight `w* = -T(G) / (H + lambda)`, optionally capped at
//!   `max_delta_step` in absolute value
//! - structure score `T(G)^2 / (H + lambda)`
//!
//! A split's gain is half the children's scores minus the parent's score,
//! minus `min_split_loss`.

use crate::config::TrainParam;
use crate::core::types::{BinIndex, FeatureIndex, GradStats};
use crate::tree::node::SplitCondition;

/// Best split found for a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitEntry {
    /// Feature index for the split
    pub feature: FeatureIndex,
    /// Largest bin routed left
    pub split_bin: BinIndex,
    /// Upper bound of `split_bin` in raw units, `f64::MAX` for the last bin
    pub threshold: f64,
    /// Default direction for missing values
    pub default_left: bool,
    /// Loss reduction, already net of `min_split_loss`
    pub gain: f64,
    /// Left child statistics
    pub left_sum: GradStats,
    /// Right child statistics
    pub right_sum: GradStats,
}

impl SplitEntry {
    /// Routing rule of this split.
    pub fn condition(&self) -> SplitCondition {
        SplitCondition {
            feature: self.feature,
            split_bin: self.split_bin,
            threshold: self.threshold,
            default_left: self.default_left,
        }
    }

    /// Whether this candidate replaces `current` as the best split.
    ///
    /// Only a strictly larger gain wins, so among equal gains the candidate
    /// seen first is kept.
    #[inline]
    pub fn is_better_than(&self, current: Option<&SplitEntry>) -> bool {
        match current {
            None => true,
            Some(best) => self.gain > best.gain,
        }
    }
}

/// Evaluates weights and structure scores under the configured regularization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitScorer {
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// L1 penalty on leaf weights
    pub reg_alpha: f64,
    /// Largest absolute leaf weight, 0 disables the clamp
    pub max_delta_step: f64,
}

impl SplitScorer {
    /// Reads the regularisation terms from `param`.
    pub fn from_param(param: &TrainParam) -> Self {
        SplitScorer {
            reg_lambda: param.reg_lambda,
            reg_alpha: param.reg_alpha,
            max_delta_step: param.max_delta_step,
        }
    }

    /// Soft-thresholds a gradient sum by the L1 penalty.
    #[inline]
    pub fn threshold_l1(&self, sum_grad: f64) -> f64 {
        if sum_grad > self.reg_alpha {
            sum_grad - self.reg_alpha
        } else if sum_grad < -self.reg_alpha {
            sum_grad + self.reg_alpha
        } else {
            0.0
        }
    }

    /// Optimal weight of a node, before monotone bounds and shrinkage.
    pub fn weight(&self, stats: GradStats) -> f64 {
        let denominator = stats.sum_hess + self.reg_lambda;
        if denominator <= 0.0 {
            return 0.0;
        }
        let weight = -self.threshold_l1(stats.sum_grad) / denominator;
        if self.max_delta_step > 0.0 && weight.abs() > self.max_delta_step {
            self.max_delta_step.copysign(weight)
        } else {
            weight
        }
    }

    /// Structure score of a node at its own optimal weight.
    pub fn score(&self, stats: GradStats) -> f64 {
        let denominator = stats.sum_hess + self.reg_lambda;
        if denominator <= 0.0 {
            return 0.0;
        }
        if self.max_delta_step > 0.0 {
            return self.score_given_weight(stats, self.weight(stats));
        }
        let g = self.threshold_l1(stats.sum_grad);
        g * g / denominator
    }

    /// Structure score of a node held at `weight`.
    pub fn score_given_weight(&self, stats: GradStats, weight: f64) -> f64 {
        if stats.sum_hess + self.reg_lambda <= 0.0 {
            return 0.0;
        }
        -(2.0 * self.threshold_l1(stats.sum_grad) * weight
            + (stats.sum_hess + self.reg_lambda) * weight * weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn scorer(lambda: f64, alpha: f64, max_delta_step: f64) -> SplitScorer {
        SplitScorer {
            reg_lambda: lambda,
            reg_alpha: alpha,
            max_delta_step,
        }
    }

    #[test]
    fn test_weight() {
        let s = scorer(1.0, 0.0, 0.0);
        assert_abs_diff_eq!(s.weight(GradStats::new(-5.0, 2.0)), 5.0 / 3.0, epsilon = 1e-12);

        let s = scorer(0.1, 1.0, 0.0);
        assert_abs_diff_eq!(
            s.weight(GradStats::new(-10.0, 5.0)),
            9.0 / 5.1,
            epsilon = 1e-12
        );
        assert_eq!(s.weight(GradStats::new(0.5, 5.0)), 0.0);

        let s = scorer(1.0, 0.0, 0.7);
        assert_eq!(s.weight(GradStats::new(-5.0, 2.0)), 0.7);
        assert_eq!(s.weight(GradStats::new(5.0, 2.0)), -0.7);

        let s = scorer(0.0, 0.0, 0.0);
        assert_eq!(s.weight(GradStats::new(1.0, 0.0)), 0.0);
    }

    #[test]
    fn test_score_matches_weighted_form() {
        let s = scorer(1.0, 0.5, 0.0);
        let stats = GradStats::new(-4.0, 3.0);
        let closed = s.score(stats);
        let weighted = s.score_given_weight(stats, s.weight(stats));
        assert_abs_diff_eq!(closed, weighted, epsilon = 1e-12);
        assert_abs_diff_eq!(closed, 3.5 * 3.5 / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_is_better_than() {
        let entry = SplitEntry {
            feature: 0,
            split_bin: 1,
            threshold: 1.5,
            default_left: false,
            gain: 2.0,
            left_sum: GradStats::default(),
            right_sum: GradStats::default(),
        };
        let mut tie = entry;
        tie.feature = 3;
        assert!(entry.is_better_than(None));
        assert!(!tie.is_better_than(Some(&entry)));
        tie.gain = 2.5;
        assert!(tie.is_better_than(Some(&entry)));
        assert_eq!(entry.condition().split_bin, 1);
    }
}
