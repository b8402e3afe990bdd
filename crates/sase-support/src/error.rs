//! Error types for the support engine

use thiserror::Error;

use crate::ports::outbound::RepositoryError;

#[derive(Error, Debug)]
pub enum SupportError {
    /// Hydration target missing or not a ticket
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// A record or metadata write failed
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<RepositoryError> for SupportError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => Self::NotFound(what),
            other => Self::Persistence(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SupportError>;
