//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique key is already taken: a client-side id for the user, or a login.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend is temporarily unable to serve the request.
    #[error("storage busy: {0}")]
    Busy(String),

    /// The backend rejected a statement or a transaction.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("corruption detected: {0}")]
    Corruption(String),
}

impl StorageError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Busy(_))
    }
}

/// A specialized Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_busy_is_retryable() {
        assert!(StorageError::Busy("locked".into()).is_retryable());
        assert!(!StorageError::Database("syntax".into()).is_retryable());
        assert!(!StorageError::AlreadyExists("c1".into()).is_retryable());
    }
}
