//! Shared error types for archforge.
//!
//! Module-specific errors (agent, pipeline, report) live next to the code
//! that produces them; this module holds the errors shared across seams.

use thiserror::Error;

/// Errors that can occur while talking to an LLM endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The API base URL environment variable is not set.
    #[error("Missing API base URL: ARCHFORGE_API_BASE environment variable not set")]
    MissingApiBase,

    /// The HTTP request could not be completed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The provider returned a well-formed error payload.
    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// The provider response could not be parsed.
    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    /// The provider returned a response with no choices.
    #[error("LLM response contained no completion choices")]
    EmptyResponse,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
