//! Left children fan out towards +x and right children towards -x. An offset
//! is widened when the child's subtree would reach the parent's column.

use serde::Serialize;
use shared::{
    domain::NodeId,
    tree::{max_depth, DecisionNode, DecisionTree, NodeKind, TreeError},
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutOptions {
    pub origin: Point,
    pub column_width: f64,
    pub row_height: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            origin: Point::default(),
            column_width: 40.0,
            row_height: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeLabel {
    /// Edge to the left child: `feature > threshold` does not hold.
    False,
    /// Edge to the right child: the split predicate holds.
    True,
}

impl EdgeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::False => "false",
            Self::True => "true",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramNode {
    pub id: String,
    pub node_id: NodeId,
    pub position: Point,
    pub label: String,
    pub selected: bool,
    pub leaf: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramEdge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    pub label: EdgeLabel,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Diagram {
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

impl Diagram {
    pub fn node(&self, node_id: NodeId) -> Option<&DiagramNode> {
        self.nodes.iter().find(|node| node.node_id == node_id)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("cannot label node: {0}")]
    InvalidNode(#[from] TreeError),
    #[error("node {node_id} splits on feature {feature_index} which has no name")]
    UnknownFeature {
        node_id: NodeId,
        feature_index: usize,
    },
    #[error("node {node_id} predicts class {output} which has no name")]
    UnknownClass { node_id: NodeId, output: usize },
}

pub fn node_label(tree: &DecisionTree, node: &DecisionNode) -> Result<String, LayoutError> {
    match node.kind()? {
        NodeKind::Leaf { output } => tree
            .class_name(output)
            .map(str::to_owned)
            .ok_or(LayoutError::UnknownClass {
                node_id: node.node_id,
                output,
            }),
        NodeKind::Split {
            feature_index,
            threshold,
        } => {
            let name = tree
                .feature_name(feature_index)
                .ok_or(LayoutError::UnknownFeature {
                    node_id: node.node_id,
                    feature_index,
                })?;
            if tree.is_one_hot(feature_index) {
                Ok(name.to_owned())
            } else {
                Ok(format!("{name} > {threshold:.2}"))
            }
        }
    }
}

pub fn layout_tree(
    tree: &DecisionTree,
    options: &LayoutOptions,
    selected: Option<NodeId>,
) -> Result<Diagram, LayoutError> {
    let shape = measure(&tree.root, options.column_width);
    let mut diagram = Diagram::default();
    place(
        tree,
        &tree.root,
        &shape,
        options.origin,
        options,
        selected,
        &mut diagram,
    )?;
    Ok(diagram)
}

/// Horizontal footprint of a subtree, relative to its root's x.
#[derive(Debug, Clone, Copy)]
struct Extent {
    lo: f64,
    hi: f64,
}

struct Shape {
    extent: Extent,
    left: Option<(f64, Box<Shape>)>,
    right: Option<(f64, Box<Shape>)>,
}

fn fan_width(parent: &DecisionNode, child: &DecisionNode, column_width: f64) -> f64 {
    (f64::from(max_depth(child)) - f64::from(parent.depth) + 1.0) * column_width
}

fn measure(node: &DecisionNode, column_width: f64) -> Shape {
    let mut extent = Extent { lo: 0.0, hi: 0.0 };

    let left = node.left.as_deref().map(|child| {
        let shape = measure(child, column_width);
        let offset = fan_width(node, child, column_width).max(column_width - shape.extent.lo);
        extent.lo = extent.lo.min(offset + shape.extent.lo);
        extent.hi = extent.hi.max(offset + shape.extent.hi);
        (offset, Box::new(shape))
    });

    let right = node.right.as_deref().map(|child| {
        let shape = measure(child, column_width);
        let offset = fan_width(node, child, column_width).max(column_width + shape.extent.hi);
        extent.lo = extent.lo.min(shape.extent.lo - offset);
        extent.hi = extent.hi.max(shape.extent.hi - offset);
        (offset, Box::new(shape))
    });

    Shape {
        extent,
        left,
        right,
    }
}

fn place(
    tree: &DecisionTree,
    node: &DecisionNode,
    shape: &Shape,
    at: Point,
    options: &LayoutOptions,
    selected: Option<NodeId>,
    diagram: &mut Diagram,
) -> Result<(), LayoutError> {
    diagram.nodes.push(DiagramNode {
        id: node.node_id.to_string(),
        node_id: node.node_id,
        position: at,
        label: node_label(tree, node)?,
        selected: selected == Some(node.node_id),
        leaf: node.is_leaf(),
    });

    let children = [
        (node.left.as_deref(), shape.left.as_ref(), 1.0, EdgeLabel::False),
        (node.right.as_deref(), shape.right.as_ref(), -1.0, EdgeLabel::True),
    ];
    for (child, child_shape, direction, label) in children {
        let (Some(child), Some((offset, child_shape))) = (child, child_shape) else {
            continue;
        };
        diagram.edges.push(DiagramEdge {
            id: format!("e-{}-{}", node.node_id, child.node_id),
            source: node.node_id,
            target: child.node_id,
            label,
        });
        let child_at = Point {
            x: at.x + direction * offset,
            y: at.y + options.row_height,
        };
        place(tree, child, child_shape, child_at, options, selected, diagram)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/layout_tests.rs"]
mod tests;
