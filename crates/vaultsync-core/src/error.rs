//! The closed set of failure kinds raised by the engine.

use thiserror::Error;
use vaultsync_auth::TokenError;
use vaultsync_storage::StorageError;

/// Why authentication failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No authorization header.
    MissingHeader,
    /// Header not of the form `<scheme> <token>`.
    MalformedHeader,
    /// Scheme present, token empty.
    EmptyToken,
    /// Token verified but expired.
    Expired,
    /// Token failed to verify.
    InvalidToken,
    /// Unknown login or wrong master password.
    InvalidCredentials,
}

impl AuthFailure {
    /// Stable, client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeader => "missing authorization header",
            AuthFailure::MalformedHeader => "malformed authorization header",
            AuthFailure::EmptyToken => "empty token",
            AuthFailure::Expired => "token expired",
            AuthFailure::InvalidToken => "invalid token",
            AuthFailure::InvalidCredentials => "invalid login or password",
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors surfaced by the synchronization engine.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Empty list, missing user id or version, blank id, bad length.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The caller could not be authenticated.
    #[error("authentication failed: {0}")]
    Authentication(AuthFailure),

    /// The request names a user other than the caller.
    #[error("user id does not match the authenticated user")]
    Authorization,

    /// A targeted mutation named an unknown or tombstoned record.
    #[error("record not found: {0}")]
    NotFound(String),

    /// An upload collided with an existing client-side id, or a
    /// registration with an existing login.
    #[error("already exists: {0}")]
    UniquenessConflict(String),

    /// The stored version differs from the one the client submitted.
    #[error("version conflict on {client_side_id}: stored {stored}, submitted {submitted}")]
    VersionConflict {
        /// The offending item.
        client_side_id: String,
        /// Version currently stored.
        stored: u64,
        /// Version the client sent.
        submitted: u64,
    },

    /// The envelope MAC did not match the payload list.
    #[error("integrity check failed")]
    Integrity,

    /// The credential store failed during registration or login.
    #[error("upstream failure: {0}")]
    BadGateway(String),

    /// The request was cancelled; any transaction was rolled back.
    #[error("request cancelled")]
    Cancelled,

    /// The store failed.
    #[error("storage error: {message}")]
    Storage {
        /// Whether the same request may succeed later.
        retryable: bool,
        /// Backend message, for logs.
        message: String,
    },

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Creates a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        VaultError::Validation(msg.into())
    }

    /// Short, stable label of the kind, for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::Validation(_) => "validation",
            VaultError::Authentication(_) => "authentication",
            VaultError::Authorization => "authorization",
            VaultError::NotFound(_) => "not_found",
            VaultError::UniquenessConflict(_) => "uniqueness_conflict",
            VaultError::VersionConflict { .. } => "version_conflict",
            VaultError::Integrity => "integrity",
            VaultError::BadGateway(_) => "bad_gateway",
            VaultError::Cancelled => "cancelled",
            VaultError::Storage { .. } => "storage",
            VaultError::Internal(_) => "internal",
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists(key) => VaultError::UniquenessConflict(key),
            StorageError::NotFound(key) => VaultError::NotFound(key),
            other => VaultError::Storage {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

impl From<TokenError> for VaultError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingHeader => VaultError::Authentication(AuthFailure::MissingHeader),
            TokenError::MalformedHeader => VaultError::Authentication(AuthFailure::MalformedHeader),
            TokenError::EmptyToken => VaultError::Authentication(AuthFailure::EmptyToken),
            TokenError::Expired => VaultError::Authentication(AuthFailure::Expired),
            TokenError::Invalid(_) => VaultError::Authentication(AuthFailure::InvalidToken),
            TokenError::Crypto(msg) => VaultError::Internal(msg),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, VaultError>;
