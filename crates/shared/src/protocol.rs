use serde::{Deserialize, Serialize};

use crate::{
    domain::{NodeId, SessionId},
    tree::DecisionTree,
};

/// Status string the service reports alongside a stored tree.
pub const TREE_LOADED_STATUS: &str = "tree loaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutDirection {
    #[default]
    Auto,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelToUse {
    Original,
    #[default]
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FineTuneMode {
    #[default]
    ChangedComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    pub prefix_length: u32,
    pub cat_attributes: Vec<String>,
    pub num_attributes: Vec<String>,
    pub sensitive_attributes: Vec<String>,
    pub test_split: f64,
    pub epochs: u32,
    pub learning_rate: f64,
    pub hidden_units: Vec<u32>,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            prefix_length: 3,
            cat_attributes: vec!["gender".into()],
            num_attributes: vec!["age".into()],
            sensitive_attributes: vec!["gender".into(), "age".into()],
            test_split: 0.3,
            epochs: 5,
            learning_rate: 0.001,
            hidden_units: vec![512, 256, 128, 64, 32],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistillParams {
    pub min_samples_split: u32,
    pub max_depth: u32,
    pub ccp_alpha: f64,
    #[serde(default)]
    pub model_to_use: ModelToUse,
}

impl Default for DistillParams {
    fn default() -> Self {
        Self {
            min_samples_split: 2,
            max_depth: 100,
            ccp_alpha: 0.001,
            model_to_use: ModelToUse::Latest,
        }
    }
}

impl DistillParams {
    pub fn with_model(self, model_to_use: ModelToUse) -> Self {
        Self {
            model_to_use,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FineTuneParams {
    pub mode: FineTuneMode,
    pub learning_rate: f64,
    pub epoch: u32,
    pub batch_size: u32,
}

impl Default for FineTuneParams {
    fn default() -> Self {
        Self {
            mode: FineTuneMode::ChangedComplete,
            learning_rate: 0.001,
            epoch: 5,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutNodeParams {
    pub node_id: NodeId,
    pub direction: CutDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrainNodeParams {
    pub node_id: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTreeParams {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest<T> {
    pub folder_name: SessionId,
    #[serde(flatten)]
    pub params: T,
}

impl<T> SessionRequest<T> {
    pub fn new(session_id: &SessionId, params: T) -> Self {
        Self {
            folder_name: session_id.clone(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub f1_score: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Renders a `[0, 1]` score as a percentage with two decimals, e.g. `"91.25%"`.
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub attributes: Vec<String>,
    pub events_per_case: f64,
    pub num_cases: u64,
    pub num_events: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainResult {
    pub nn_evaluation: Metrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistillResult {
    pub nn_evaluation: Metrics,
    pub dt_evaluation: Metrics,
}

/// Cut and retrain acknowledgements; some service builds omit the metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModifyResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nn_evaluation: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt_evaluation: Option<Metrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FineTuneResult {
    pub nn_evaluation: Metrics,
    pub dt_evaluation: Metrics,
    pub nn_modified_evaluation: Metrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTreeResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<DecisionTree>,
}

impl LoadTreeResponse {
    pub fn loaded(tree: DecisionTree) -> Self {
        Self {
            status: TREE_LOADED_STATUS.to_string(),
            tree: Some(tree),
        }
    }

    /// The "no tree" sentinel: anything but an explicit loaded status.
    pub fn into_tree(self) -> Option<DecisionTree> {
        if self.status == TREE_LOADED_STATUS {
            self.tree
        } else {
            None
        }
    }
}
