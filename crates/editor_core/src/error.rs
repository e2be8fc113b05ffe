use client_core::ClientError;
use shared::tree::TreeError;
use thiserror::Error;

use crate::{
    events::Operation, layout::LayoutError, notify::Notification, workflow::WorkflowError,
};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Service(#[from] ClientError),
    #[error("model service returned an invalid tree: {0}")]
    InvalidTree(#[from] TreeError),
    #[error("model service reported no tree after {0}")]
    MissingTree(Operation),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    /// The triggering control should have been disabled; reaching this is a
    /// bug in the host, not something to show the user.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
    #[error("another operation is still in flight")]
    Busy,
}

impl EditorError {
    pub fn raises_notification(&self) -> bool {
        matches!(
            self,
            Self::Service(_) | Self::InvalidTree(_) | Self::MissingTree(_)
        )
    }

    pub fn notification(&self, operation: Operation) -> Option<Notification> {
        match self {
            Self::Service(err) => Some(Notification::from_client_error(operation, err)),
            Self::InvalidTree(err) => Some(Notification::invalid_tree(operation, err)),
            Self::MissingTree(op) => Some(Notification::missing_tree(*op)),
            Self::Layout(_) | Self::Workflow(_) | Self::Precondition(_) | Self::Busy => None,
        }
    }
}
