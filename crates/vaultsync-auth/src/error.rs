//! Error types for the auth crate.

use thiserror::Error;

/// Errors raised while reading, issuing, or verifying credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// No `Authorization` header was sent.
    #[error("missing authorization header")]
    MissingHeader,

    /// The header is not of the form `<scheme> <token>`.
    #[error("malformed authorization header")]
    MalformedHeader,

    /// The header carries a scheme but no token.
    #[error("empty bearer token")]
    EmptyToken,

    /// The token verified but its expiry is in the past.
    #[error("token expired")]
    Expired,

    /// The token could not be decoded or its signature, issuer, or subject
    /// did not verify.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// Signing a token or hashing a password failed.
    #[error("crypto error: {0}")]
    Crypto(String),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, TokenError>;
