//! Tree nodes.
//!
//! A node starts life as a leaf and becomes internal exactly once, when a
//! split is applied to it. Internal nodes keep their gradient statistics and
//! base weight so that the tree can be inspected after growth.

use crate::core::types::{BinIndex, FeatureIndex, GradStats, NodeIndex, Score};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Split decision stored on an internal node.
///
/// Rows whose bin is at most `split_bin` go left, rows with a missing value
/// follow `default_left`. The equivalent raw-value rule is `value <= threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitCondition {
    /// Feature the node splits on
    pub feature: FeatureIndex,
    /// Largest bin routed to the left child
    pub split_bin: BinIndex,
    /// Upper bound of `split_bin` in raw feature units, `f64::MAX` when
    /// `split_bin` is the last bin
    pub threshold: f64,
    /// Direction taken by rows with a missing value
    pub default_left: bool,
}

impl SplitCondition {
    /// Whether a row with the given bin goes to the left child.
    #[inline]
    pub fn goes_left(&self, bin: Option<BinIndex>) -> bool {
        match bin {
            Some(bin) => bin <= self.split_bin,
            None => self.default_left,
        }
    }

    /// Whether a row with the given raw value goes to the left child.
    #[inline]
    pub fn goes_left_value(&self, value: f32) -> bool {
        if value.is_nan() {
            self.default_left
        } else {
            (value as f64) <= self.threshold
        }
    }
}

/// Tree node representation supporting both internal and leaf nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    parent: Option<NodeIndex>,
    depth: u32,
    /// Gradient statistics of the rows that reached this node
    stats: GradStats,
    /// Unshrunk optimal weight of the node
    base_weight: f64,
    /// Shrunk output used when the node is a leaf
    leaf_value: Score,
    split: Option<SplitCondition>,
    children: Option<(NodeIndex, NodeIndex)>,
    /// Loss reduction of the applied split
    gain: f64,
}

impl TreeNode {
    /// Creates a new leaf node.
    pub fn new_leaf(
        parent: Option<NodeIndex>,
        depth: u32,
        stats: GradStats,
        base_weight: f64,
        leaf_value: Score,
    ) -> Self {
        TreeNode {
            parent,
            depth,
            stats,
            base_weight,
            leaf_value,
            split: None,
            children: None,
            gain: 0.0,
        }
    }

    /// Returns true if this node is a leaf node.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Returns the parent node index.
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// Returns the node depth, zero for the root.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Gradient statistics of the rows that reached this node.
    pub fn stats(&self) -> GradStats {
        self.stats
    }

    /// Unshrunk optimal weight of the node.
    pub fn base_weight(&self) -> f64 {
        self.base_weight
    }

    /// Returns the leaf output value (for leaf nodes).
    pub fn leaf_value(&self) -> Option<Score> {
        if self.is_leaf() {
            Some(self.leaf_value)
        } else {
            None
        }
    }

    /// Returns the split of an internal node.
    pub fn split(&self) -> Option<&SplitCondition> {
        self.split.as_ref()
    }

    /// Returns the left child node index (for internal nodes).
    pub fn left_child(&self) -> Option<NodeIndex> {
        self.children.map(|(left, _)| left)
    }

    /// Returns the right child node index (for internal nodes).
    pub fn right_child(&self) -> Option<NodeIndex> {
        self.children.map(|(_, right)| right)
    }

    /// Returns the split gain value.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub(crate) fn set_leaf_value(&mut self, value: Score) {
        self.leaf_value = value;
    }

    /// Converts this node from leaf to internal node.
    pub(crate) fn set_split(
        &mut self,
        split: SplitCondition,
        left: NodeIndex,
        right: NodeIndex,
        gain: f64,
    ) {
        self.split = Some(split);
        self.children = Some((left, right));
        self.gain = gain;
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.split, self.children) {
            (Some(split), Some((left, right))) => write!(
                f,
                "Internal(f{} <= bin {} [{:.4}], gain={:.4}, missing={}, children={}/{})",
                split.feature,
                split.split_bin,
                split.threshold,
                self.gain,
                if split.default_left { "left" } else { "right" },
                left,
                right
            ),
            _ => write!(
                f,
                "Leaf(value={:.6}, sum_grad={:.4}, sum_hess={:.4})",
                self.leaf_value, self.stats.sum_grad, self.stats.sum_hess
            ),
        }
    }
}
