use super::*;
use proptest::prelude::*;

const FEATURES: usize = 4;
const CLASSES: usize = 3;

fn three_node_tree() -> DecisionTree {
    DecisionTree {
        root: DecisionNode::split(
            NodeId(0),
            0,
            0,
            5.0,
            DecisionNode::leaf(NodeId(1), 1, 0),
            DecisionNode::leaf(NodeId(2), 1, 1),
        ),
        id_counter: 3,
        feature_names: vec!["age".into(), "gender = female".into()],
        class_names: vec!["accept".into(), "reject".into()],
        feature_indices: BTreeMap::from([
            ("age".to_string(), vec![0]),
            ("gender".to_string(), vec![1]),
        ]),
    }
}

#[derive(Debug, Clone)]
enum Shape {
    Leaf(usize),
    Split(usize, f64, Box<Shape>, Box<Shape>),
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = (0..CLASSES).prop_map(Shape::Leaf);
    leaf.prop_recursive(6, 64, 2, |inner| {
        (0..FEATURES, -10.0f64..10.0, inner.clone(), inner)
            .prop_map(|(feature, threshold, left, right)| {
                Shape::Split(feature, threshold, Box::new(left), Box::new(right))
            })
    })
}

fn build(shape: &Shape, depth: u32, next_id: &mut i64) -> DecisionNode {
    let node_id = NodeId(*next_id);
    *next_id += 1;
    match shape {
        Shape::Leaf(output) => DecisionNode::leaf(node_id, depth, *output),
        Shape::Split(feature, threshold, left, right) => {
            let left = build(left, depth + 1, next_id);
            let right = build(right, depth + 1, next_id);
            DecisionNode::split(node_id, depth, *feature, *threshold, left, right)
        }
    }
}

fn tree_from(shape: &Shape) -> DecisionTree {
    let mut next_id = 0;
    let root = build(shape, 0, &mut next_id);
    DecisionTree {
        root,
        id_counter: next_id,
        feature_names: (0..FEATURES).map(|i| format!("f{i}")).collect(),
        class_names: (0..CLASSES).map(|i| format!("c{i}")).collect(),
        feature_indices: BTreeMap::new(),
    }
}

fn nth_mut<'a>(node: &'a mut DecisionNode, remaining: &mut usize) -> Option<&'a mut DecisionNode> {
    if *remaining == 0 {
        return Some(node);
    }
    *remaining -= 1;
    if let Some(left) = node.left.as_deref_mut() {
        if let Some(found) = nth_mut(left, remaining) {
            return Some(found);
        }
    }
    if let Some(right) = node.right.as_deref_mut() {
        if let Some(found) = nth_mut(right, remaining) {
            return Some(found);
        }
    }
    None
}

#[derive(Debug, Clone, Copy)]
enum Defect {
    OneChild,
    NoOutputNoSplit,
    BothKinds,
    DepthSkip,
}

fn defect_strategy() -> impl Strategy<Value = Defect> {
    prop_oneof![
        Just(Defect::OneChild),
        Just(Defect::NoOutputNoSplit),
        Just(Defect::BothKinds),
        Just(Defect::DepthSkip),
    ]
}

fn corrupt(node: &mut DecisionNode, defect: Defect, fresh_id: i64) {
    match defect {
        Defect::OneChild => {
            if node.is_leaf() {
                node.left = Some(Box::new(DecisionNode::leaf(
                    NodeId(fresh_id),
                    node.depth + 1,
                    0,
                )));
            } else {
                node.right = None;
            }
        }
        Defect::NoOutputNoSplit => {
            node.output = None;
            node.feature_index = None;
            node.threshold = None;
        }
        Defect::BothKinds => {
            node.output = Some(0);
            node.feature_index = Some(0);
            node.threshold = Some(1.0);
        }
        Defect::DepthSkip => node.depth += 1,
    }
}

proptest! {
    #[test]
    fn prop_well_formed_trees_validate(shape in shape_strategy()) {
        let tree = tree_from(&shape);
        prop_assert_eq!(tree.validate(), Ok(()));
    }

    #[test]
    fn prop_malformed_trees_are_rejected(
        shape in shape_strategy(),
        pick in any::<prop::sample::Index>(),
        defect in defect_strategy(),
    ) {
        let mut tree = tree_from(&shape);
        let fresh_id = tree.id_counter;
        let mut remaining = pick.index(tree.node_count());
        let node = nth_mut(&mut tree.root, &mut remaining).expect("index within node count");
        corrupt(node, defect, fresh_id);
        prop_assert!(tree.validate().is_err(), "defect {:?} went unnoticed", defect);
    }

    #[test]
    fn prop_max_depth_bounds_node_depth(shape in shape_strategy()) {
        let tree = tree_from(&shape);
        for node in tree.nodes() {
            let deepest = max_depth(node);
            prop_assert!(deepest >= node.depth);
            if node.is_leaf() {
                prop_assert_eq!(deepest, node.depth);
            }
        }
    }
}

#[test]
fn classifies_leaves_and_splits() {
    let tree = three_node_tree();
    assert_eq!(
        tree.root.kind(),
        Ok(NodeKind::Split {
            feature_index: 0,
            threshold: 5.0
        })
    );
    let left = tree.root.left.as_deref().expect("left child");
    assert_eq!(left.kind(), Ok(NodeKind::Leaf { output: 0 }));
}

#[test]
fn reports_the_specific_defect() {
    let mut tree = three_node_tree();
    tree.root.right = None;
    assert_eq!(
        tree.validate(),
        Err(TreeError::SingleChild { node_id: NodeId(0) })
    );

    let mut tree = three_node_tree();
    if let Some(right) = tree.root.right.as_deref_mut() {
        right.node_id = NodeId(1);
    }
    assert_eq!(
        tree.validate(),
        Err(TreeError::DuplicateNodeId { node_id: NodeId(1) })
    );

    let mut tree = three_node_tree();
    tree.root.feature_index = Some(7);
    assert!(matches!(
        tree.validate(),
        Err(TreeError::FeatureOutOfRange { feature_index: 7, .. })
    ));
}

#[test]
fn preorder_visits_left_before_right() {
    let tree = three_node_tree();
    let ids: Vec<i64> = tree.nodes().map(|node| node.node_id.0).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(tree.node_count(), 3);
    assert_eq!(tree.find(NodeId(2)).and_then(|n| n.output), Some(1));
    assert!(tree.find(NodeId(9)).is_none());
}

#[test]
fn detects_one_hot_columns() {
    let tree = three_node_tree();
    assert!(!tree.is_one_hot(0));
    assert!(tree.is_one_hot(1));
    assert_eq!(tree.categorical_group(1), Some("gender"));
    assert!(!tree.is_one_hot(42));
}

#[test]
fn numeric_attribute_spread_over_columns_is_not_one_hot() {
    let mut tree = three_node_tree();
    tree.feature_names = vec!["age_1".into(), "age_2".into(), "gender = female".into()];
    tree.feature_indices = BTreeMap::from([
        ("age".to_string(), vec![0, 1]),
        ("gender".to_string(), vec![2]),
    ]);

    assert!(!tree.is_one_hot(0));
    assert!(!tree.is_one_hot(1));
    assert_eq!(tree.categorical_group(1), None);
    assert_eq!(tree.categorical_group(2), Some("gender"));
}

#[test]
fn one_hot_column_without_group_falls_back_to_its_label() {
    let mut tree = three_node_tree();
    tree.feature_indices.clear();
    assert_eq!(tree.categorical_group(1), Some("gender"));
    assert!(!tree.is_one_hot(0));
}

#[test]
fn decodes_service_json() {
    let raw = r#"{
        "root": {
            "node_id": 0, "depth": 0, "feature_index": 0, "threshold": 5.0,
            "output": null, "num_samples": 120, "removed_features": [],
            "left": {"node_id": 1, "depth": 1, "feature_index": null, "threshold": null,
                     "output": 0, "num_samples": 70, "removed_features": [0],
                     "left": null, "right": null},
            "right": {"node_id": 2, "depth": 1, "feature_index": null, "threshold": null,
                      "output": 1, "num_samples": 50, "removed_features": [],
                      "left": null, "right": null}
        },
        "id_counter": 3,
        "feature_names": ["age"],
        "class_names": ["accept", "reject"],
        "feature_indices": {"age": [0]}
    }"#;

    let tree: DecisionTree = serde_json::from_str(raw).expect("decode tree");
    assert_eq!(tree.validate(), Ok(()));
    assert_eq!(tree.root.num_samples, 120);
    let left = tree.root.left.as_deref().expect("left");
    assert!(left.removed_features.contains(&0));
}
