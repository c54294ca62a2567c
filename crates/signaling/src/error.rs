//! Signaling error types.

use thiserror::Error;

/// Signaling error type.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Collaborator service error.
    #[error("Collaborator error: {0}")]
    Service(#[from] external_services::Error),

    /// Connection not found.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Channel send error.
    #[error("Channel send error")]
    ChannelSend,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for signaling operations.
pub type Result<T> = std::result::Result<T, SignalingError>;
