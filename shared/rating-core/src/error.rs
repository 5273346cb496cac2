//! Error types for the rating platform

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RatingError>;

#[derive(Error, Debug)]
pub enum RatingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RatingError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Query(_) => "QUERY_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for RatingError {
    fn from(err: std::io::Error) -> Self {
        RatingError::Internal(err.to_string())
    }
}
