//! Candidate nodes waiting in the expansion queue.

use crate::config::TrainParam;
use crate::core::constants::K_RT_EPS;
use crate::core::types::NodeIndex;
use crate::tree::split::SplitEntry;
use std::fmt::Debug;

/// A node that may be expanded, together with its best split.
pub trait ExpandEntry: Clone + Send + Sync + Debug {
    /// Id of the node in the tree.
    fn node_id(&self) -> NodeIndex;

    /// Depth of the node, root is 0.
    fn depth(&self) -> u32;

    /// Gain of the best split, `0` when the node has none.
    fn loss_change(&self) -> f64;

    /// Whether the node may still be split with `num_leaves` leaves grown.
    fn is_valid(&self, param: &TrainParam, num_leaves: usize) -> bool;
}

/// Expansion entry for the histogram-based CPU grower.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuExpandEntry {
    /// Node id
    pub nid: NodeIndex,
    /// Depth of the node, root is 0
    pub depth: u32,
    /// Best split found for the node, if any
    pub split: Option<SplitEntry>,
}

impl CpuExpandEntry {
    /// Entry for `nid` before its split is evaluated.
    pub fn new(nid: NodeIndex, depth: u32) -> Self {
        CpuExpandEntry {
            nid,
            depth,
            split: None,
        }
    }
}

impl ExpandEntry for CpuExpandEntry {
    fn node_id(&self) -> NodeIndex {
        self.nid
    }

    fn depth(&self) -> u32 {
        self.depth
    }

    fn loss_change(&self) -> f64 {
        self.split.map_or(0.0, |s| s.gain)
    }

    fn is_valid(&self, param: &TrainParam, num_leaves: usize) -> bool {
        let split = match &self.split {
            Some(split) => split,
            None => return false,
        };
        if split.gain <= K_RT_EPS {
            return false;
        }
        if split.left_sum.sum_hess == 0.0 || split.right_sum.sum_hess == 0.0 {
            return false;
        }
        if self.depth >= param.max_depth {
            return false;
        }
        param.max_leaves == 0 || num_leaves < param.max_leaves as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GradStats;

    fn entry(depth: u32, gain: f64) -> CpuExpandEntry {
        CpuExpandEntry {
            nid: 0,
            depth,
            split: Some(SplitEntry {
                feature: 0,
                split_bin: 0,
                threshold: 0.5,
                default_left: false,
                gain,
                left_sum: GradStats::new(-1.0, 1.0),
                right_sum: GradStats::new(1.0, 1.0),
            }),
        }
    }

    #[test]
    fn test_is_valid() {
        let mut param = TrainParam::default();
        param.max_depth = 2;

        assert!(entry(0, 1.0).is_valid(&param, 1));
        assert!(!entry(2, 1.0).is_valid(&param, 1));
        assert!(!entry(0, 0.0).is_valid(&param, 1));
        assert!(!CpuExpandEntry::new(0, 0).is_valid(&param, 1));

        param.max_leaves = 3;
        assert!(entry(1, 1.0).is_valid(&param, 2));
        assert!(!entry(1, 1.0).is_valid(&param, 3));
    }

    #[test]
    fn test_empty_child_is_invalid() {
        let param = TrainParam::default();
        let mut e = entry(0, 1.0);
        if let Some(split) = e.split.as_mut() {
            split.right_sum = GradStats::default();
        }
        assert!(!e.is_valid(&param, 1));
        assert_eq!(e.loss_change(), 1.0);
        assert_eq!(CpuExpandEntry::new(4, 1).loss_change(), 0.0);
    }
}
