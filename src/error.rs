//! Error types for duoHome

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`DuoError`]
pub type Result<T> = std::result::Result<T, DuoError>;

/// Main error type for duoHome
#[derive(Debug, Error)]
pub enum DuoError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// Transport failure while a stream was open (reset, read error)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response from the model server
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request superseded or cancelled before completion
    #[error("Request cancelled")]
    Cancelled,

    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// No API key configured for a provider that needs one
    #[error("Missing API key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// Conversation upload service rejected a request
    #[error("Conversation log error: {0}")]
    ConversationLog(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl DuoError {
    /// Whether the error came from the network path rather than local state
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::HttpStatus { .. } | Self::Http(_)
        )
    }

    /// The single message shown to the child when a reply fails
    #[must_use]
    pub fn friendly_message(&self) -> &'static str {
        if self.is_transport() {
            "抱歉，我现在无法回应，请检查AI服务是否正常运行。"
        } else {
            "抱歉，出了一点小问题，我们再试一次吧。"
        }
    }
}

impl From<String> for DuoError {
    fn from(s: String) -> Self {
        DuoError::Other(s)
    }
}

impl From<&str> for DuoError {
    fn from(s: &str) -> Self {
        DuoError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_share_friendly_message() {
        let err = DuoError::HttpStatus {
            status: 502,
            body: "bad gateway".into(),
        };
        assert!(err.is_transport());
        assert_eq!(
            err.friendly_message(),
            DuoError::Transport("reset".into()).friendly_message()
        );
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
    }

    #[test]
    fn test_local_errors_are_not_transport() {
        assert!(!DuoError::Cancelled.is_transport());
        assert!(!DuoError::from("boom").is_transport());
    }
}
