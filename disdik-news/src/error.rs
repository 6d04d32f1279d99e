//! Error types for the news module

use thiserror::Error;

/// Errors that can occur while acquiring news
#[derive(Debug, Error)]
pub enum NewsError {
    /// Request did not complete within its time budget
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// HTTP request failed before a response was received
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Upstream returned a non-success status where success was required
    #[error("Upstream error (status {status}): {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// URL that produced the status
        url: String,
    },

    /// Failed to parse a feed or page
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A run produced zero qualifying items
    #[error("No qualifying candidates")]
    NoCandidates,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
