use serde::{Deserialize, Serialize};

/// Body the Model Service attaches to non-success responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ServiceErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            status: Some("failed".to_string()),
        }
    }

    /// Human readable diagnostic, preferring the explicit error text.
    pub fn message(&self) -> Option<&str> {
        [self.error.as_deref(), self.status.as_deref()]
            .into_iter()
            .flatten()
            .find(|message| !message.trim().is_empty())
    }
}
