//! Error types for step agents.

use thiserror::Error;

/// Unrecoverable faults raised by step agents.
///
/// Anything retryable is expressed as an unsuccessful `AgentResponse`
/// instead; these errors halt the run immediately.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent was constructed or wired incorrectly.
    #[error("Agent configuration error: {0}")]
    Configuration(String),

    /// The orchestrator handed this agent an input it cannot process.
    #[error("Unsupported input for agent '{agent}': {reason}")]
    UnsupportedInput { agent: String, reason: String },

    /// IO error (unreadable diagram, unwritable output directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
