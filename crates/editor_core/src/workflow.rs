use std::fmt;

use shared::protocol::{DistillResult, TrainResult, UploadSummary};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    #[default]
    Upload,
    LogStatistics,
    Train,
    TrainResults,
    Distill,
    DistillResults,
    InteractiveEdit,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Upload,
        Stage::LogStatistics,
        Stage::Train,
        Stage::TrainResults,
        Stage::Distill,
        Stage::DistillResults,
        Stage::InteractiveEdit,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Upload => "Upload",
            Self::LogStatistics => "Event Log Statistics",
            Self::Train => "Train",
            Self::TrainResults => "Training Results",
            Self::Distill => "Distill",
            Self::DistillResults => "Distillation Results",
            Self::InteractiveEdit => "Interactive Edit",
        }
    }

    pub fn next(self) -> Option<Stage> {
        let index = Self::ALL.iter().position(|stage| *stage == self)?;
        Self::ALL.get(index + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("stage '{0}' is not available yet")]
    StageDisabled(Stage),
    #[error("'{0}' is the last stage")]
    NoNextStage(Stage),
}

/// Pure stage gating. Results recorded here survive backward navigation.
#[derive(Debug, Clone, Default)]
pub struct StageMachine {
    current: Stage,
    upload: Option<UploadSummary>,
    train: Option<TrainResult>,
    distill: Option<DistillResult>,
    has_tree: bool,
}

impl StageMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(has_tree: bool) -> Self {
        let mut machine = Self::new();
        machine.has_tree = has_tree;
        if has_tree {
            machine.current = Stage::InteractiveEdit;
        }
        machine
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn upload_summary(&self) -> Option<&UploadSummary> {
        self.upload.as_ref()
    }

    pub fn train_result(&self) -> Option<&TrainResult> {
        self.train.as_ref()
    }

    pub fn distill_result(&self) -> Option<&DistillResult> {
        self.distill.as_ref()
    }

    pub fn has_tree(&self) -> bool {
        self.has_tree
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Upload | Stage::Train | Stage::Distill => true,
            Stage::LogStatistics => self.upload.is_some(),
            Stage::TrainResults => self.train.is_some(),
            Stage::DistillResults => self.distill.is_some(),
            Stage::InteractiveEdit => self.has_tree,
        }
    }

    pub fn select(&mut self, stage: Stage) -> Result<(), WorkflowError> {
        if !self.is_enabled(stage) {
            return Err(WorkflowError::StageDisabled(stage));
        }
        self.current = stage;
        Ok(())
    }

    pub fn advance(&mut self) -> Result<Stage, WorkflowError> {
        let next = self
            .current
            .next()
            .ok_or(WorkflowError::NoNextStage(self.current))?;
        self.select(next)?;
        Ok(next)
    }

    pub fn record_upload(&mut self, summary: UploadSummary) -> Stage {
        self.upload = Some(summary);
        self.move_to(Stage::LogStatistics)
    }

    pub fn record_train(&mut self, result: TrainResult) -> Stage {
        self.train = Some(result);
        self.move_to(Stage::TrainResults)
    }

    /// Distillation lands directly in the editor rather than on its results
    /// page; the results stay reachable through [`Self::select`].
    pub fn record_distill(&mut self, result: DistillResult) -> Stage {
        self.distill = Some(result);
        self.has_tree = true;
        self.move_to(Stage::InteractiveEdit)
    }

    fn move_to(&mut self, stage: Stage) -> Stage {
        if self.current != stage {
            info!(from = %self.current, to = %stage, "stage advanced");
        }
        self.current = stage;
        stage
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
