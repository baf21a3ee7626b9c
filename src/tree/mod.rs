//! Decision tree structures and the building blocks of tree growth.
//!
//! This module holds the arena tree, node histograms, split evaluation and
//! row subsampling. The orchestration of one growth pass lives in
//! [`crate::treelearner`].

pub mod histogram;
pub mod node;
pub mod sampling;
pub mod split;
pub mod tree;

pub use histogram::{HistogramBuilder, HistogramPool, SubtractionPlan};
pub use node::{SplitCondition, TreeNode};
pub use sampling::RowSampler;
pub use split::{ConstraintSet, HistEvaluator, MonotonicConstraint, SplitEntry, SplitScorer};
pub use tree::{LeafInit, RegTree};
