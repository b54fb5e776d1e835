//! # AppError
//!
//! Centralized error handling for the community board.
//! Maps forum failures to actionable error types.

use thiserror::Error;

/// The primary error type for all cb-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Post, Reply)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., blank title or content)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The supplied creator identifier does not own the entity
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Infrastructure failure (e.g., unwritable file, unreachable hosted store)
    #[error("storage error: {0}")]
    Storage(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        AppError::NotFound(kind.to_string(), id.to_string())
    }

    /// Wraps a store failure, keeping the full cause chain in the message.
    pub fn storage(action: &str, err: anyhow::Error) -> Self {
        AppError::Storage(format!("{action}: {err:#}"))
    }
}

/// A specialized Result type for community board logic.
pub type Result<T> = std::result::Result<T, AppError>;
