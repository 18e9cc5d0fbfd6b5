//! Vault owners.

use std::fmt;

use crate::UserId;

/// A registered vault owner.
///
/// Not `Serialize`: the master password hash never leaves the
/// server. The encryption salt is handed out separately on request.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    /// Opaque identifier.
    pub id: UserId,
    /// Unique, case-sensitive login.
    pub login: String,
    /// Argon2id PHC string of the master password.
    pub password_hash: String,
    /// Salt the client uses to derive its encryption key.
    pub encryption_salt: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("password_hash", &"<redacted>")
            .field("encryption_salt", &self.encryption_salt)
            .finish()
    }
}
