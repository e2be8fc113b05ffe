//! Plain-text renderings of results and trees for terminal hosts.

use std::fmt::Write;

use shared::{
    domain::NodeId,
    protocol::{
        format_percent, DistillResult, FineTuneResult, Metrics, ModifyResult, TrainResult,
        UploadSummary,
    },
    tree::{DecisionNode, DecisionTree},
};

use crate::layout::{node_label, EdgeLabel, LayoutError};

const METRIC_COLUMNS: [&str; 4] = ["Accuracy", "F1", "Precision", "Recall"];
const METRIC_WIDTH: usize = 9;

pub type MetricsRow = (&'static str, Metrics);

pub fn metrics_table(rows: &[MetricsRow]) -> String {
    let model_width = rows
        .iter()
        .map(|(model, _)| model.len())
        .chain(std::iter::once("Model".len()))
        .max()
        .unwrap_or_default();

    let mut out = format!("{:<model_width$}", "Model");
    for column in METRIC_COLUMNS {
        let _ = write!(out, "  {column:>METRIC_WIDTH$}");
    }
    out.push('\n');
    out.push_str(&"-".repeat(model_width + METRIC_COLUMNS.len() * (METRIC_WIDTH + 2)));
    out.push('\n');

    for (model, metrics) in rows {
        let _ = write!(out, "{model:<model_width$}");
        for value in [
            metrics.accuracy,
            metrics.f1_score,
            metrics.precision,
            metrics.recall,
        ] {
            let _ = write!(out, "  {:>METRIC_WIDTH$}", format_percent(value));
        }
        out.push('\n');
    }
    out
}

pub fn train_rows(result: &TrainResult) -> Vec<MetricsRow> {
    vec![("Neural Network", result.nn_evaluation)]
}

pub fn distill_rows(result: &DistillResult) -> Vec<MetricsRow> {
    vec![
        ("Neural Network", result.nn_evaluation),
        ("Decision Tree", result.dt_evaluation),
    ]
}

/// Empty when the service only acknowledged the modification.
pub fn modify_rows(result: &ModifyResult) -> Vec<MetricsRow> {
    [
        ("Neural Network", result.nn_evaluation),
        ("Decision Tree", result.dt_evaluation),
    ]
    .into_iter()
    .filter_map(|(model, metrics)| metrics.map(|metrics| (model, metrics)))
    .collect()
}

pub fn fine_tune_rows(result: &FineTuneResult) -> Vec<MetricsRow> {
    vec![
        ("Neural Network", result.nn_evaluation),
        ("Fine-tuned Network", result.nn_modified_evaluation),
        ("Edited Decision Tree", result.dt_evaluation),
    ]
}

pub fn upload_table(summary: &UploadSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cases            {}", summary.num_cases);
    let _ = writeln!(out, "Events           {}", summary.num_events);
    let _ = writeln!(out, "Events per case  {:.2}", summary.events_per_case);
    let _ = writeln!(out, "Attributes       {}", summary.attributes.join(", "));
    out
}

/// Indented tree with node ids, one node per line. The selected node is
/// marked with `*`.
pub fn outline(tree: &DecisionTree, selected: Option<NodeId>) -> Result<String, LayoutError> {
    let mut out = String::new();
    outline_node(tree, &tree.root, selected, None, "", "", &mut out)?;
    Ok(out)
}

fn outline_node(
    tree: &DecisionTree,
    node: &DecisionNode,
    selected: Option<NodeId>,
    edge: Option<EdgeLabel>,
    lead: &str,
    indent: &str,
    out: &mut String,
) -> Result<(), LayoutError> {
    let marker = if selected == Some(node.node_id) { "*" } else { " " };
    let edge = edge.map(|label| format!("{}: ", label.as_str())).unwrap_or_default();
    let _ = writeln!(
        out,
        "{lead}{edge}{marker}[{}] {}",
        node.node_id,
        node_label(tree, node)?
    );

    let children = [
        (node.left.as_deref(), EdgeLabel::False),
        (node.right.as_deref(), EdgeLabel::True),
    ];
    let count = children.iter().filter(|(child, _)| child.is_some()).count();
    for (position, (child, label)) in children
        .into_iter()
        .filter_map(|(child, label)| child.map(|child| (child, label)))
        .enumerate()
    {
        let last = position + 1 == count;
        let (branch, carry) = if last { ("└─ ", "   ") } else { ("├─ ", "│  ") };
        outline_node(
            tree,
            child,
            selected,
            Some(label),
            &format!("{indent}{branch}"),
            &format!("{indent}{carry}"),
            out,
        )?;
    }
    Ok(())
}
