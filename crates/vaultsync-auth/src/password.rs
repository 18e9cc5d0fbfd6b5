//! Master-password verifiers and encryption salts.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;

use crate::error::{Result, TokenError};

/// Length in bytes of a client encryption salt before hex encoding.
pub const ENCRYPTION_SALT_LEN: usize = 32;

/// Hashes a master password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TokenError::Crypto(format!("password hashing failed: {}", e)))
}

/// Checks `password` against a stored PHC string.
///
/// Returns `Ok(false)` on mismatch; errors only if the stored hash is unreadable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| TokenError::Crypto(format!("invalid hash format: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Generates a random hex-encoded salt for client-side key derivation.
pub fn generate_encryption_salt() -> String {
    let mut bytes = [0u8; ENCRYPTION_SALT_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
