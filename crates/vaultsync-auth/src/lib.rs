//! Authentication for vaultsync.
//!
//! - [`TokenService`] issues and verifies HMAC-SHA256 signed bearer tokens
//!   whose subject is the caller's [`UserId`](vaultsync_types::UserId).
//! - [`extract_bearer`] pulls the token out of an `Authorization` header.
//! - [`hash_password`] / [`verify_password`] handle Argon2id master-password
//!   verifiers, and [`generate_encryption_salt`] the per-user key-derivation
//!   salt handed to clients.

mod error;
mod password;
mod token;

pub use error::{Result, TokenError};
pub use password::{generate_encryption_salt, hash_password, verify_password};
pub use token::{extract_bearer, Claims, IssuedToken, TokenService};
