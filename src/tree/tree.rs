//! Regression tree produced by one round of growth.
//!
//! Nodes live in an arena indexed by [`NodeIndex`]. The root is node 0 and a
//! split appends its two children at the end, left first, so node ids grow in
//! the order splits are applied.

use crate::core::error::{GrowerError, Result};
use crate::core::types::{FeatureIndex, GradStats, NodeIndex, RowIndex, Score};
use crate::dataset::QuantizedMatrix;
use crate::tree::node::{SplitCondition, TreeNode};
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics and outputs of a freshly created leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafInit {
    /// Gradient statistics of the rows reaching the leaf
    pub stats: GradStats,
    /// Unshrunk optimal weight
    pub base_weight: f64,
    /// Shrunk leaf output
    pub leaf_value: Score,
}

/// Regression tree with binary splits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegTree {
    nodes: Vec<TreeNode>,
    num_leaves: usize,
    max_depth: u32,
}

impl Default for RegTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegTree {
    /// Creates a tree made of a single zero-valued root leaf.
    pub fn new() -> Self {
        RegTree {
            nodes: vec![TreeNode::new_leaf(None, 0, GradStats::default(), 0.0, 0.0)],
            num_leaves: 1,
            max_depth: 0,
        }
    }

    /// Creates a single-leaf tree from the root's statistics.
    pub fn with_root(root: LeafInit) -> Self {
        RegTree {
            nodes: vec![TreeNode::new_leaf(
                None,
                0,
                root.stats,
                root.base_weight,
                root.leaf_value,
            )],
            num_leaves: 1,
            max_depth: 0,
        }
    }

    /// Returns the number of nodes in the tree.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of leaf nodes in the tree.
    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Returns the tree depth (maximum depth of any node).
    pub fn depth(&self) -> u32 {
        self.max_depth
    }

    /// Returns a reference to the node at the given index.
    pub fn node(&self, index: NodeIndex) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    /// Returns the root node of the tree.
    pub fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    /// Iterates over all nodes with their ids.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &TreeNode)> + '_ {
        self.nodes.iter().enumerate()
    }

    /// Whether `index` is a leaf. Unknown ids are not leaves.
    pub fn is_leaf(&self, index: NodeIndex) -> bool {
        self.nodes.get(index).map_or(false, |n| n.is_leaf())
    }

    /// Turns leaf `index` into an internal node with two new leaf children.
    pub fn apply_split(
        &mut self,
        index: NodeIndex,
        split: SplitCondition,
        gain: f64,
        left: LeafInit,
        right: LeafInit,
    ) -> Result<(NodeIndex, NodeIndex)> {
        let depth = match self.nodes.get(index) {
            Some(node) if node.is_leaf() => node.depth() + 1,
            Some(_) => {
                return Err(GrowerError::data_consistency(format!(
                    "node {} is already split",
                    index
                )))
            }
            None => {
                return Err(GrowerError::data_consistency(format!(
                    "node {} does not exist in a tree of {} nodes",
                    index,
                    self.nodes.len()
                )))
            }
        };

        let left_index = self.nodes.len();
        let right_index = left_index + 1;
        self.nodes.push(TreeNode::new_leaf(
            Some(index),
            depth,
            left.stats,
            left.base_weight,
            left.leaf_value,
        ));
        self.nodes.push(TreeNode::new_leaf(
            Some(index),
            depth,
            right.stats,
            right.base_weight,
            right.leaf_value,
        ));
        self.nodes[index].set_split(split, left_index, right_index, gain);

        self.num_leaves += 1;
        self.max_depth = self.max_depth.max(depth);
        Ok((left_index, right_index))
    }

    /// Overwrites the output of a leaf.
    pub fn set_leaf_value(&mut self, index: NodeIndex, value: Score) -> Result<()> {
        match self.nodes.get_mut(index) {
            Some(node) if node.is_leaf() => {
                node.set_leaf_value(value);
                Ok(())
            }
            _ => Err(GrowerError::data_consistency(format!(
                "node {} is not a leaf",
                index
            ))),
        }
    }

    /// Returns all leaf node indices in id order.
    pub fn leaf_indices(&self) -> Vec<NodeIndex> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| if node.is_leaf() { Some(i) } else { None })
            .collect()
    }

    /// Leaf output per node id, zero for internal nodes.
    pub fn leaf_values(&self) -> Vec<Score> {
        self.nodes
            .iter()
            .map(|node| node.leaf_value().unwrap_or(0.0))
            .collect()
    }

    /// Features split on along the path from the root to `index`, in path order.
    pub fn branch_features(&self, index: NodeIndex) -> Vec<FeatureIndex> {
        let mut features = Vec::new();
        let mut current = self.nodes.get(index).and_then(|n| n.parent());
        while let Some(parent) = current {
            let node = &self.nodes[parent];
            if let Some(split) = node.split() {
                features.push(split.feature);
            }
            current = node.parent();
        }
        features.reverse();
        features
    }

    /// Follows the binned values of `row` down to its leaf.
    pub fn leaf_for_row(&self, matrix: &QuantizedMatrix, row: RowIndex) -> NodeIndex {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            match (node.split(), node.left_child(), node.right_child()) {
                (Some(split), Some(left), Some(right)) => {
                    index = if split.goes_left(matrix.bin(row, split.feature)) {
                        left
                    } else {
                        right
                    };
                }
                _ => return index,
            }
        }
    }

    /// Predicts a row of a quantized matrix.
    pub fn predict_binned(&self, matrix: &QuantizedMatrix, row: RowIndex) -> Score {
        self.nodes[self.leaf_for_row(matrix, row)]
            .leaf_value()
            .unwrap_or(0.0)
    }

    fn required_width(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|n| n.split().map(|s| s.feature + 1))
            .max()
            .unwrap_or(0)
    }

    fn leaf_for_values(&self, values: ArrayView1<'_, f32>) -> NodeIndex {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            match (node.split(), node.left_child(), node.right_child()) {
                (Some(split), Some(left), Some(right)) => {
                    index = if split.goes_left_value(values[split.feature]) {
                        left
                    } else {
                        right
                    };
                }
                _ => return index,
            }
        }
    }

    /// Predicts the leaf index for raw feature values.
    pub fn predict_leaf_index(&self, values: ArrayView1<'_, f32>) -> Result<NodeIndex> {
        let width = self.required_width();
        if values.len() < width {
            return Err(GrowerError::dimension_mismatch(
                format!("at least {} features", width),
                values.len().to_string(),
            ));
        }
        Ok(self.leaf_for_values(values))
    }

    /// Predicts the output for raw feature values. NaN is treated as missing.
    pub fn predict_row(&self, values: ArrayView1<'_, f32>) -> Result<Score> {
        let leaf = self.predict_leaf_index(values)?;
        Ok(self.nodes[leaf].leaf_value().unwrap_or(0.0))
    }

    /// Predicts every row of a row-major raw matrix in parallel.
    pub fn predict_batch(&self, values: ArrayView2<'_, f32>) -> Result<Array1<Score>> {
        let width = self.required_width();
        if values.ncols() < width {
            return Err(GrowerError::dimension_mismatch(
                format!("at least {} features", width),
                values.ncols().to_string(),
            ));
        }

        let mut predictions = Array1::zeros(values.nrows());
        Zip::from(&mut predictions)
            .and(values.rows())
            .par_for_each(|prediction, row| {
                *prediction = self.nodes[self.leaf_for_values(row)]
                    .leaf_value()
                    .unwrap_or(0.0);
            });
        Ok(predictions)
    }

    /// Checks parent/child links and the leaf count.
    pub fn validate(&self) -> Result<()> {
        if self.nodes[0].parent().is_some() {
            return Err(GrowerError::data_consistency("root node has a parent"));
        }

        let mut leaf_count = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            match (node.left_child(), node.right_child()) {
                (None, None) => leaf_count += 1,
                (Some(left), Some(right)) => {
                    for child in [left, right] {
                        let linked = self.nodes.get(child).and_then(|c| c.parent());
                        if linked != Some(i) {
                            return Err(GrowerError::data_consistency(format!(
                                "child {} of node {} does not point back to it",
                                child, i
                            )));
                        }
                    }
                }
                _ => {
                    return Err(GrowerError::data_consistency(format!(
                        "node {} has a single child",
                        i
                    )))
                }
            }
        }

        if leaf_count != self.num_leaves {
            return Err(GrowerError::data_consistency(format!(
                "leaf count mismatch: expected {}, found {}",
                self.num_leaves, leaf_count
            )));
        }
        Ok(())
    }

    /// Returns a textual representation of the tree structure.
    pub fn to_string_representation(&self) -> String {
        let mut result = String::new();
        self.write_subtree(0, "", true, &mut result);
        result
    }

    fn write_subtree(&self, index: NodeIndex, prefix: &str, is_last: bool, result: &mut String) {
        let node = &self.nodes[index];
        let branch = if is_last { "└── " } else { "├── " };
        result.push_str(&format!("{}{}[{}] {}\n", prefix, branch, index, node));

        if let (Some(left), Some(right)) = (node.left_child(), node.right_child()) {
            let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
            self.write_subtree(left, &child_prefix, false, result);
            self.write_subtree(right, &child_prefix, true, result);
        }
    }

    /// Converts the tree to a JSON representation.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Creates a tree from a JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        let tree: RegTree = serde_json::from_str(json)?;
        tree.validate()?;
        Ok(tree)
    }
}

impl fmt::Display for RegTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegTree(nodes={}, leaves={}, depth={})",
            self.num_nodes(),
            self.num_leaves(),
            self.depth()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn leaf(value: Score) -> LeafInit {
        LeafInit {
            stats: GradStats::new(0.0, 1.0),
            base_weight: value as f64,
            leaf_value: value,
        }
    }

    fn stump() -> RegTree {
        let mut tree = RegTree::with_root(leaf(0.0));
        tree.apply_split(
            0,
            SplitCondition {
                feature: 1,
                split_bin: 0,
                threshold: 2.5,
                default_left: true,
            },
            1.5,
            leaf(1.0),
            leaf(-1.0),
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_new_tree() {
        let tree = RegTree::new();
        assert_eq!(tree.num_nodes(), 1);
        assert_eq!(tree.num_leaves(), 1);
        assert_eq!(tree.depth(), 0);
        assert!(tree.root().is_leaf());
    }

    #[test]
    fn test_apply_split() {
        let mut tree = stump();
        assert_eq!(tree.num_nodes(), 3);
        assert_eq!(tree.num_leaves(), 2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.leaf_indices(), vec![1, 2]);
        assert_eq!(tree.leaf_values(), vec![0.0, 1.0, -1.0]);
        assert_eq!(tree.branch_features(2), vec![1]);
        assert!(tree.validate().is_ok());

        let split = *tree.root().split().unwrap();
        assert!(tree.apply_split(0, split, 1.0, leaf(0.0), leaf(0.0)).is_err());
        assert!(tree.apply_split(7, split, 1.0, leaf(0.0), leaf(0.0)).is_err());
    }

    #[test]
    fn test_predict_row() {
        let tree = stump();
        assert_eq!(tree.predict_row(array![9.0f32, 2.0].view()).unwrap(), 1.0);
        assert_eq!(tree.predict_row(array![9.0f32, 3.0].view()).unwrap(), -1.0);
        assert_eq!(tree.predict_row(array![9.0f32, f32::NAN].view()).unwrap(), 1.0);
        assert!(tree.predict_row(array![9.0f32].view()).is_err());
    }

    #[test]
    fn test_predict_batch() {
        let tree = stump();
        let values = array![[0.0f32, 1.0], [0.0, 4.0], [0.0, f32::NAN]];
        let predictions = tree.predict_batch(values.view()).unwrap();
        assert_eq!(predictions.to_vec(), vec![1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_predict_binned() {
        let tree = stump();
        let matrix = QuantizedMatrix::from_column_bins(
            3,
            vec![vec![Some(0); 3], vec![Some(0), Some(1), None]],
            vec![vec![1.0], vec![2.5, 5.0]],
            0.0,
        )
        .unwrap();
        assert_eq!(tree.predict_binned(&matrix, 0), 1.0);
        assert_eq!(tree.predict_binned(&matrix, 1), -1.0);
        assert_eq!(tree.leaf_for_row(&matrix, 2), 1);
    }

    #[test]
    fn test_serialization() {
        let tree = stump();
        let json = tree.to_json().unwrap();
        let restored = RegTree::from_json(&json).unwrap();
        assert_eq!(tree, restored);
        assert!(tree.to_string_representation().contains("Leaf(value=-1.000000"));
    }
}
