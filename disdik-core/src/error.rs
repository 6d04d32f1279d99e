//! Error types for the core data model

use thiserror::Error;

/// Errors raised while building or validating core records
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid article: {0}")]
    InvalidArticle(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl CoreError {
    pub fn invalid_article(msg: impl Into<String>) -> Self {
        CoreError::InvalidArticle(msg.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        CoreError::InvalidQuery(msg.into())
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
