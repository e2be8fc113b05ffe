//! Events the engine broadcasts to whatever is rendering it.

use std::fmt;

use shared::{domain::NodeId, protocol::FineTuneResult};

use crate::{notify::Notification, workflow::Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Upload,
    Train,
    Distill,
    Cut,
    Retrain,
    FineTune,
    Confirm,
    Revert,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Upload => "upload",
            Self::Train => "train",
            Self::Distill => "distill",
            Self::Cut => "cut",
            Self::Retrain => "retrain",
            Self::FineTune => "fine_tune",
            Self::Confirm => "confirm",
            Self::Revert => "revert",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub enum EditorEvent {
    TreeReplaced { node_count: usize },
    SelectionChanged(Option<NodeId>),
    WorkingChanged(bool),
    StageChanged(Stage),
    FineTuneReady(FineTuneResult),
    Notification(Notification),
}
