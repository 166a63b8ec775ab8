use thiserror::Error;

/// Errors raised while resolving or executing a connector operation.
#[derive(Error, Debug)]
pub enum DocuGenError {
    /// The static registry is inconsistent, or an unknown resource/operation
    /// pair was requested.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing required field: {field}")]
    MissingRequiredField { field: String },

    #[error("Invalid value for field {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    /// The remote API answered with a non-success status. The body is kept
    /// verbatim.
    #[error("Remote request failed with HTTP {status}: {body}")]
    RemoteRequest { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Credential error: {0}")]
    Credential(String),
}

impl DocuGenError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for failures reported by (or on the way to) the remote API.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteRequest { .. } | Self::Transport(_))
    }

    /// Remote HTTP status when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRequest { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DocuGenError>;
