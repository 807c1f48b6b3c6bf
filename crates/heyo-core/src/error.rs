// Error types for the agent loop

use thiserror::Error;

/// Result type alias for agent loop operations
pub type Result<T> = std::result::Result<T, AgentLoopError>;

/// Errors that can occur during agent loop execution
///
/// Tool failures are deliberately absent: they are folded back into the
/// conversation as tool results and never abort a request.
#[derive(Debug, Error)]
pub enum AgentLoopError {
    /// The inference backend could not be reached
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The inference backend answered with a non-success status
    #[error("backend error: {0}")]
    BackendError(String),

    /// The backend stream broke off mid-response
    #[error("backend stream error: {0}")]
    BackendStream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No messages to process
    #[error("No messages to process")]
    NoMessages,

    /// The client went away before the loop finished
    #[error("Loop cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentLoopError {
    /// Create a backend unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        AgentLoopError::BackendUnavailable(msg.into())
    }

    /// Create a backend error carrying the backend's response body
    pub fn backend(msg: impl Into<String>) -> Self {
        AgentLoopError::BackendError(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        AgentLoopError::BackendStream(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AgentLoopError::Configuration(msg.into())
    }

    /// Whether this error means the client disconnected
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentLoopError::Cancelled)
    }
}
