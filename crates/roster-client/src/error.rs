//! Client error types.

use roster_core::envelope::EnvelopeError;
use roster_core::resource::SchemaError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("not authorized{}", fmt_message(.message))]
    Unauthorized { message: Option<String> },

    #[error("server returned {status}{}", fmt_message(.message))]
    Status { status: u16, message: Option<String> },

    #[error("request was not successful{}", fmt_message(.message))]
    Rejected { message: Option<String> },

    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),

    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("session store: {0}")]
    Session(String),
}

fn fmt_message(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl From<EnvelopeError> for ApiError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Rejected { message } => Self::Rejected { message },
            EnvelopeError::UnexpectedFormat(what) => Self::UnexpectedFormat(what),
            EnvelopeError::Decode(e) => Self::Decode(e),
        }
    }
}

impl ApiError {
    /// The server-supplied message when there is one, otherwise `default`.
    pub fn user_message(&self, default: &str) -> String {
        match self {
            Self::Unauthorized { message }
            | Self::Status { message, .. }
            | Self::Rejected { message } => message.clone().unwrap_or_else(|| default.to_string()),
            Self::Schema(e) => e.to_string(),
            _ => default.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
