//! Monotone and interaction constraints on splits.
//!
//! Monotone constraints are enforced through per-node weight bounds: a split
//! on a constrained feature must order the two child weights, and the
//! midpoint of those weights becomes a bound on each child's subtree.
//! Interaction constraints restrict which features may appear together on one
//! root-to-leaf path.

use crate::config::TrainParam;
use crate::core::error::{GrowerError, Result};
use crate::core::types::FeatureIndex;
use std::collections::BTreeSet;
use std::fmt;

/// Monotonic constraint types for individual features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonotonicConstraint {
    /// No monotonic constraint
    None,
    /// Output must not decrease as the feature grows
    Increasing,
    /// Output must not increase as the feature grows
    Decreasing,
}

impl Default for MonotonicConstraint {
    fn default() -> Self {
        MonotonicConstraint::None
    }
}

impl MonotonicConstraint {
    /// Parses the `-1 / 0 / 1` encoding used in parameters.
    pub fn from_sign(sign: i8) -> Result<Self> {
        match sign {
            -1 => Ok(MonotonicConstraint::Decreasing),
            0 => Ok(MonotonicConstraint::None),
            1 => Ok(MonotonicConstraint::Increasing),
            other => Err(GrowerError::invalid_parameter(
                "monotone_constraints",
                other.to_string(),
                "entries must be -1, 0 or 1",
            )),
        }
    }
}

impl fmt::Display for MonotonicConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonotonicConstraint::None => write!(f, "none"),
            MonotonicConstraint::Increasing => write!(f, "increasing"),
            MonotonicConstraint::Decreasing => write!(f, "decreasing"),
        }
    }
}

/// Closed interval that a node's weight is clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightBounds {
    /// Smallest allowed weight
    pub lower: f64,
    /// Largest allowed weight
    pub upper: f64,
}

impl Default for WeightBounds {
    fn default() -> Self {
        WeightBounds::unbounded()
    }
}

impl WeightBounds {
    /// Bounds that never clamp.
    pub fn unbounded() -> Self {
        WeightBounds {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Clamps `weight` into the bounds.
    #[inline]
    pub fn clamp(&self, weight: f64) -> f64 {
        weight.max(self.lower).min(self.upper)
    }

    /// Bounds of the two children after splitting on a feature with
    /// `constraint`, given the children's clamped weights.
    pub fn split(
        &self,
        constraint: MonotonicConstraint,
        left_weight: f64,
        right_weight: f64,
    ) -> (WeightBounds, WeightBounds) {
        let mid = (left_weight + right_weight) / 2.0;
        let mut left = *self;
        let mut right = *self;
        match constraint {
            MonotonicConstraint::None => {}
            MonotonicConstraint::Increasing => {
                left.upper = mid;
                right.lower = mid;
            }
            MonotonicConstraint::Decreasing => {
                left.lower = mid;
                right.upper = mid;
            }
        }
        (left, right)
    }
}

/// Feature interaction constraint specification.
#[derive(Debug, Clone, Default)]
pub struct InteractionConstraint {
    groups: Vec<BTreeSet<FeatureIndex>>,
}

impl InteractionConstraint {
    /// Creates a constraint from groups of interacting features.
    pub fn new(groups: &[Vec<FeatureIndex>]) -> Self {
        InteractionConstraint {
            groups: groups
                .iter()
                .filter(|g| !g.is_empty())
                .map(|g| g.iter().copied().collect())
                .collect(),
        }
    }

    /// Whether no interaction groups are configured.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Checks if `feature` may split a node whose path already uses `path`.
    ///
    /// The root may use any feature. Below it, a feature is allowed if it is
    /// already on the path or if some group contains it together with every
    /// path feature.
    pub fn can_use_feature(&self, feature: FeatureIndex, path: &[FeatureIndex]) -> bool {
        if self.groups.is_empty() || path.is_empty() || path.contains(&feature) {
            return true;
        }
        self.groups
            .iter()
            .any(|group| group.contains(&feature) && path.iter().all(|f| group.contains(f)))
    }

    /// Keeps only the features usable below `path`.
    pub fn filter(&self, features: &[FeatureIndex], path: &[FeatureIndex]) -> Vec<FeatureIndex> {
        features
            .iter()
            .copied()
            .filter(|&f| self.can_use_feature(f, path))
            .collect()
    }
}

/// All split constraints of one tree.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    monotone: Vec<MonotonicConstraint>,
    interactions: InteractionConstraint,
}

impl ConstraintSet {
    /// Builds the constraints described by `param`.
    pub fn from_param(param: &TrainParam) -> Result<Self> {
        let monotone = param
            .monotone_constraints
            .iter()
            .map(|&sign| MonotonicConstraint::from_sign(sign))
            .collect::<Result<Vec<_>>>()?;
        Ok(ConstraintSet {
            monotone,
            interactions: InteractionConstraint::new(&param.interaction_constraints),
        })
    }

    /// Monotone constraint of `feature`; unlisted features are unconstrained.
    #[inline]
    pub fn monotone(&self, feature: FeatureIndex) -> MonotonicConstraint {
        self.monotone.get(feature).copied().unwrap_or_default()
    }

    /// Whether any monotone constraint is active.
    pub fn has_monotone(&self) -> bool {
        self.monotone.iter().any(|&c| c != MonotonicConstraint::None)
    }

    /// Interaction groups.
    pub fn interactions(&self) -> &InteractionConstraint {
        &self.interactions
    }
}
