//! Flat binary decision tree shared by the forest models and the interchange format.
//!
//! Nodes are stored in pre-order: children always have a larger index than their
//! parent. A row goes left when `row[feature] <= threshold`.

use crate::error::ModelError;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// One node of a flat decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Split feature index, `None` for leaves
    pub feature: Option<usize>,
    /// Split threshold (unused for leaves)
    pub threshold: f32,
    /// Index of the left child (unused for leaves)
    pub left: usize,
    /// Index of the right child (unused for leaves)
    pub right: usize,
    /// Node output: fraud probability for classifiers, path length at leaves for isolation trees
    pub value: f64,
    /// Weighted number of training samples that reached the node
    pub cover: f64,
}

impl TreeNode {
    pub fn leaf(value: f64, cover: f64) -> Self {
        Self {
            feature: None,
            threshold: 0.0,
            left: 0,
            right: 0,
            value,
            cover,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature.is_none()
    }
}

/// Binary tree in flat pre-order layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Index of the leaf reached by `row`.
    pub fn leaf_index(&self, row: ArrayView1<'_, f32>) -> usize {
        let mut idx = 0;
        while let Some(node) = self.nodes.get(idx) {
            match node.feature {
                Some(feature) => {
                    idx = if row[feature] <= node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                }
                None => break,
            }
        }
        idx
    }

    /// Node indices visited by `row`, root first.
    pub fn decision_path(&self, row: ArrayView1<'_, f32>) -> Vec<usize> {
        let mut path = Vec::new();
        let mut idx = 0;
        while let Some(node) = self.nodes.get(idx) {
            path.push(idx);
            match node.feature {
                Some(feature) => {
                    idx = if row[feature] <= node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                }
                None => break,
            }
        }
        path
    }

    /// Value of the leaf reached by `row` (0.0 for an empty tree).
    pub fn predict(&self, row: ArrayView1<'_, f32>) -> f64 {
        self.nodes
            .get(self.leaf_index(row))
            .map(|n| n.value)
            .unwrap_or(0.0)
    }

    /// Maximum root-to-leaf depth
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut max_depth = 0;
        for (idx, node) in self.nodes.iter().enumerate() {
            max_depth = max_depth.max(depths[idx]);
            if !node.is_leaf() {
                depths[node.left] = depths[idx] + 1;
                depths[node.right] = depths[idx] + 1;
            }
        }
        max_depth
    }

    /// Check the structural invariants a loaded tree must satisfy before traversal.
    pub fn validate(&self, n_features: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidParameter("tree has no nodes".to_string()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Some(feature) = node.feature {
                if feature >= n_features {
                    return Err(ModelError::ShapeMismatch {
                        expected: n_features,
                        got: feature + 1,
                    });
                }
                let in_range = |child: usize| child > idx && child < self.nodes.len();
                if !in_range(node.left) || !in_range(node.right) {
                    return Err(ModelError::InvalidParameter(format!(
                        "node {} has out-of-order children ({}, {})",
                        idx, node.left, node.right
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// Stump on feature 0 at 0.5 with leaf values 0.2 / 0.9
    pub(crate) fn stump() -> DecisionTree {
        DecisionTree {
            nodes: vec![
                TreeNode {
                    feature: Some(0),
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                    value: 0.55,
                    cover: 10.0,
                },
                TreeNode::leaf(0.2, 5.0),
                TreeNode::leaf(0.9, 5.0),
            ],
        }
    }

    #[test]
    fn test_traversal_goes_left_on_equal() {
        let tree = stump();
        assert_eq!(tree.predict(array![0.5_f32, 3.0].view()), 0.2);
        assert_eq!(tree.predict(array![0.51_f32, 3.0].view()), 0.9);
        assert_eq!(tree.decision_path(array![0.9_f32, 0.0].view()), vec![0, 2]);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_trees() {
        assert!(stump().validate(2).is_ok());
        assert!(stump().validate(0).is_err());
        assert!(DecisionTree::default().validate(2).is_err());

        let mut cyclic = stump();
        cyclic.nodes[0].left = 0;
        assert!(cyclic.validate(2).is_err());
    }
}
