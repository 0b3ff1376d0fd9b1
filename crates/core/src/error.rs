//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Input rejected by pure domain checks, before any store is touched.
///
/// Store outcomes (missing rows, duplicate codes, referenced products) and
/// ledger rejections have their own error types closer to where they arise.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. blank product code).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was not a positive integer.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        assert_eq!(
            DomainError::validation("code cannot be empty").to_string(),
            "validation failed: code cannot be empty"
        );
        assert_eq!(
            DomainError::invalid_id("ProductId: must be a positive integer").to_string(),
            "invalid identifier: ProductId: must be a positive integer"
        );
    }
}
