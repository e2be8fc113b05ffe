use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("model service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status {status}: {message}")]
    Server { status: u16, message: String },
    #[error("malformed model service response: {0}")]
    Decode(String),
    #[error("invalid model service url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::Decode(_) | Self::InvalidUrl(_) => None,
        }
    }

    pub fn is_server_reported(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}
