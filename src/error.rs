//! Error types for a3s-preview

use thiserror::Error;

/// Errors that can occur while previewing or chatting with an agent
#[derive(Debug, Error)]
pub enum PreviewError {
    /// Operation attempted before the agent record was loaded
    #[error("Agent is not loaded yet")]
    NotReady,

    /// The session token endpoint failed
    #[error("Failed to issue session token: {0}")]
    TokenIssuance(String),

    /// The chat endpoint failed after a token was obtained
    #[error("Chat request failed: {0}")]
    ChatTransport(String),

    /// A chat message with no text
    #[error("Message must not be empty")]
    EmptyMessage,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PreviewError {
    /// Message safe to show in a conversation bubble
    ///
    /// Never includes the underlying payload; the detailed error is logged
    /// by the caller instead.
    pub fn user_message(&self) -> &'static str {
        match self {
            PreviewError::NotReady => "The agent is still loading. Please try again in a moment.",
            PreviewError::TokenIssuance(_) | PreviewError::ChatTransport(_) => {
                "Preview is unavailable right now. Please try again."
            }
            PreviewError::EmptyMessage => "Type a message to send.",
            PreviewError::Config(_) | PreviewError::Serialization(_) => {
                "Something went wrong while preparing the preview. Please try again."
            }
        }
    }
}

/// Result type alias for preview operations
pub type Result<T> = std::result::Result<T, PreviewError>;
