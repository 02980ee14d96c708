//! Domain-level errors.
//!
//! These errors represent failures of the backing store vocabulary itself:
//! malformed identities and store access failures. They are independent of
//! the mapping pipeline.

use thiserror::Error;

/// Domain-specific errors for store vocabulary violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A string did not match the store's key grammar
    #[error("Invalid item id: {0}")]
    InvalidId(String),

    /// A raw value was rejected before reaching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backing store rejected or failed an operation
    #[error("Store error: {0}")]
    Store(String),
}

impl DomainError {
    /// Create an invalid id error
    pub fn invalid_id(raw: impl Into<String>) -> Self {
        DomainError::InvalidId(raw.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>) -> Self {
        DomainError::NotFound(entity.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        DomainError::Store(msg.into())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
