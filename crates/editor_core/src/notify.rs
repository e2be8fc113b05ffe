//! User-visible notifications raised when an operation fails.

use client_core::ClientError;
use shared::tree::TreeError;

use crate::events::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ServerFailure,
    Transport,
    ContractViolation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    kind: NotificationKind,
    operation: Operation,
    title: String,
    description: Option<String>,
}

impl Notification {
    pub fn from_client_error(operation: Operation, err: &ClientError) -> Self {
        match err {
            ClientError::Server { status, message } => Self {
                kind: NotificationKind::ServerFailure,
                operation,
                title: format!("Status {status}"),
                description: Some(message.clone()),
            },
            ClientError::Transport(_) => Self {
                kind: NotificationKind::Transport,
                operation,
                title: format!("{operation} failed: model service unreachable"),
                description: Some(err.to_string()),
            },
            ClientError::Decode(_) | ClientError::InvalidUrl(_) => Self {
                kind: NotificationKind::Transport,
                operation,
                title: format!("{operation} failed"),
                description: Some(err.to_string()),
            },
        }
    }

    pub fn missing_tree(operation: Operation) -> Self {
        Self {
            kind: NotificationKind::ContractViolation,
            operation,
            title: format!("{operation} succeeded but the model service returned no tree"),
            description: None,
        }
    }

    pub fn invalid_tree(operation: Operation, err: &TreeError) -> Self {
        Self {
            kind: NotificationKind::ContractViolation,
            operation,
            title: "Model service returned a malformed decision tree".to_string(),
            description: Some(err.to_string()),
        }
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_contract_violation(&self) -> bool {
        self.kind == NotificationKind::ContractViolation
    }
}
