
use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::NodeId;

/// Column labels produced by one-hot encoding read `"<attribute> = <value>"`.
pub const ONE_HOT_SEPARATOR: &str = " = ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionNode {
    pub node_id: NodeId,
    pub depth: u32,
    #[serde(default)]
    pub feature_index: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub output: Option<usize>,
    #[serde(default)]
    pub num_samples: u64,
    #[serde(default)]
    pub removed_features: BTreeSet<usize>,
    #[serde(default)]
    pub left: Option<Box<DecisionNode>>,
    #[serde(default)]
    pub right: Option<Box<DecisionNode>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Leaf { output: usize },
    Split { feature_index: usize, threshold: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {node_id} has exactly one child")]
    SingleChild { node_id: NodeId },
    #[error("node {node_id} carries an output but still has children")]
    LeafWithChildren { node_id: NodeId },
    #[error("node {node_id} carries both an output and a split")]
    AmbiguousNode { node_id: NodeId },
    #[error("node {node_id} has a feature index without a threshold or vice versa")]
    IncompleteSplit { node_id: NodeId },
    #[error("node {node_id} has neither an output nor a feature/threshold pair")]
    MissingOutputAndSplit { node_id: NodeId },
    #[error("node {node_id} has depth {found}, expected {expected}")]
    DepthMismatch {
        node_id: NodeId,
        expected: u32,
        found: u32,
    },
    #[error("node id {node_id} appears more than once")]
    DuplicateNodeId { node_id: NodeId },
    #[error("node {node_id} splits on feature {feature_index} but only {len} feature names exist")]
    FeatureOutOfRange {
        node_id: NodeId,
        feature_index: usize,
        len: usize,
    },
    #[error("node {node_id} predicts class {output} but only {len} class names exist")]
    ClassOutOfRange {
        node_id: NodeId,
        output: usize,
        len: usize,
    },
}

impl DecisionNode {
    pub fn leaf(node_id: NodeId, depth: u32, output: usize) -> Self {
        Self {
            node_id,
            depth,
            feature_index: None,
            threshold: None,
            output: Some(output),
            num_samples: 0,
            removed_features: BTreeSet::new(),
            left: None,
            right: None,
        }
    }

    pub fn split(
        node_id: NodeId,
        depth: u32,
        feature_index: usize,
        threshold: f64,
        left: DecisionNode,
        right: DecisionNode,
    ) -> Self {
        Self {
            node_id,
            depth,
            feature_index: Some(feature_index),
            threshold: Some(threshold),
            output: None,
            num_samples: 0,
            removed_features: BTreeSet::new(),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn children(&self) -> impl Iterator<Item = &DecisionNode> {
        self.left.as_deref().into_iter().chain(self.right.as_deref())
    }

    pub fn kind(&self) -> Result<NodeKind, TreeError> {
        let node_id = self.node_id;
        if self.left.is_some() != self.right.is_some() {
            return Err(TreeError::SingleChild { node_id });
        }

        match (self.output, self.feature_index, self.threshold) {
            (Some(_), None, None) if !self.is_leaf() => Err(TreeError::LeafWithChildren { node_id }),
            (Some(output), None, None) => Ok(NodeKind::Leaf { output }),
            (Some(_), _, _) => Err(TreeError::AmbiguousNode { node_id }),
            (None, Some(feature_index), Some(threshold)) => Ok(NodeKind::Split {
                feature_index,
                threshold,
            }),
            (None, Some(_), None) | (None, None, Some(_)) => {
                Err(TreeError::IncompleteSplit { node_id })
            }
            (None, None, None) => Err(TreeError::MissingOutputAndSplit { node_id }),
        }
    }
}

/// Greatest depth reachable at or below `node`; a leaf returns its own depth.
pub fn max_depth(node: &DecisionNode) -> u32 {
    match (node.left.as_deref(), node.right.as_deref()) {
        (Some(left), Some(right)) => max_depth(left).max(max_depth(right)),
        (Some(child), None) | (None, Some(child)) => max_depth(child),
        (None, None) => node.depth,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub root: DecisionNode,
    #[serde(default)]
    pub id_counter: i64,
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub class_names: Vec<String>,
    #[serde(default)]
    pub feature_indices: BTreeMap<String, Vec<usize>>,
}

impl DecisionTree {
    /// Pre-order.
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes {
            stack: vec![&self.root],
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn find(&self, node_id: NodeId) -> Option<&DecisionNode> {
        self.nodes().find(|node| node.node_id == node_id)
    }

    pub fn max_depth(&self) -> u32 {
        max_depth(&self.root)
    }

    pub fn feature_name(&self, feature_index: usize) -> Option<&str> {
        self.feature_names.get(feature_index).map(String::as_str)
    }

    pub fn class_name(&self, output: usize) -> Option<&str> {
        self.class_names.get(output).map(String::as_str)
    }

    /// Name of the original categorical attribute a one-hot column came from.
    /// Only `attribute = value` columns qualify; numeric attributes spread
    /// over several columns keep their threshold.
    pub fn categorical_group(&self, feature_index: usize) -> Option<&str> {
        let column = self.feature_name(feature_index)?;
        let (attribute, _) = column.split_once(ONE_HOT_SEPARATOR)?;
        let group = self
            .feature_indices
            .iter()
            .find(|(_, indices)| indices.contains(&feature_index))
            .map(|(group, _)| group.as_str());
        Some(group.unwrap_or(attribute))
    }

    pub fn is_one_hot(&self, feature_index: usize) -> bool {
        self.categorical_group(feature_index).is_some()
    }

    pub fn validate(&self) -> Result<(), TreeError> {
        if self.root.depth != 0 {
            return Err(TreeError::DepthMismatch {
                node_id: self.root.node_id,
                expected: 0,
                found: self.root.depth,
            });
        }

        let mut seen = HashSet::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.node_id) {
                return Err(TreeError::DuplicateNodeId {
                    node_id: node.node_id,
                });
            }

            match node.kind()? {
                NodeKind::Leaf { output } if output >= self.class_names.len() => {
                    return Err(TreeError::ClassOutOfRange {
                        node_id: node.node_id,
                        output,
                        len: self.class_names.len(),
                    });
                }
                NodeKind::Split { feature_index, .. }
                    if feature_index >= self.feature_names.len() =>
                {
                    return Err(TreeError::FeatureOutOfRange {
                        node_id: node.node_id,
                        feature_index,
                        len: self.feature_names.len(),
                    });
                }
                _ => {}
            }

            for child in node.children() {
                if child.depth != node.depth + 1 {
                    return Err(TreeError::DepthMismatch {
                        node_id: child.node_id,
                        expected: node.depth + 1,
                        found: child.depth,
                    });
                }
                stack.push(child);
            }
        }
        Ok(())
    }
}

pub struct Nodes<'a> {
    stack: Vec<&'a DecisionNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a DecisionNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Some(right) = node.right.as_deref() {
            self.stack.push(right);
        }
        if let Some(left) = node.left.as_deref() {
            self.stack.push(left);
        }
        Some(node)
    }
}

#[cfg(test)]
#[path = "tests/tree_tests.rs"]
mod tests;
