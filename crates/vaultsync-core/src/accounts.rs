//! Registration, login, and encryption salts.

use std::sync::Arc;
use vaultsync_auth::{generate_encryption_salt, hash_password, verify_password, IssuedToken, TokenService};
use vaultsync_storage::{CredentialStore, StorageError};
use vaultsync_types::{is_blank, UserId};

use crate::context::Identity;
use crate::error::{AuthFailure, Result, VaultError};
use crate::run_blocking;

/// Shortest accepted master password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The new user's id.
    pub user_id: UserId,
    /// Salt the client derives its encryption key with.
    pub encryption_salt: String,
}

/// User accounts on top of a credential store.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Credential-store failures surface as bad gateway, except a taken login.
fn upstream(err: StorageError) -> VaultError {
    match err {
        StorageError::AlreadyExists(key) => VaultError::UniquenessConflict(key),
        other => {
            tracing::error!(error = %other, "credential store failure");
            VaultError::BadGateway(other.to_string())
        }
    }
}

impl AccountService {
    /// Creates a service over `store`, issuing tokens with `tokens`.
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// The token service, for verifying bearer tokens.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Registers a new user.
    pub async fn register(&self, login: String, password: String) -> Result<Registration> {
        if is_blank(&login) {
            return Err(VaultError::validation("blank login"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(VaultError::validation(format!(
                "password must have at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let store = Arc::clone(&self.store);
        let user = run_blocking(move || {
            let password_hash = hash_password(&password)?;
            let salt = generate_encryption_salt();
            store.create_user(&login, &password_hash, &salt).map_err(upstream)
        })
        .await?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(Registration {
            user_id: user.id,
            encryption_salt: user.encryption_salt,
        })
    }

    /// Verifies a master password and issues a bearer token.
    ///
    /// Unknown logins and wrong passwords fail the same way.
    pub async fn login(&self, login: String, password: String) -> Result<IssuedToken> {
        let store = Arc::clone(&self.store);
        let user_id = run_blocking(move || {
            let user = store
                .user_by_login(&login)
                .map_err(upstream)?
                .ok_or(VaultError::Authentication(AuthFailure::InvalidCredentials))?;

            if !verify_password(&password, &user.password_hash)? {
                return Err(VaultError::Authentication(AuthFailure::InvalidCredentials));
            }
            Ok(user.id)
        })
        .await
        .inspect_err(|e| {
            if matches!(e, VaultError::Authentication(_)) {
                tracing::info!("login rejected");
            }
        })?;

        let token = self.tokens.issue(user_id)?;
        tracing::info!(user_id = %user_id, "user logged in");
        Ok(token)
    }

    /// Returns the caller's encryption salt.
    pub async fn encryption_salt(&self, identity: &Identity) -> Result<String> {
        let store = Arc::clone(&self.store);
        let user_id = identity.user_id();
        let user = run_blocking(move || store.user_by_id(user_id).map_err(VaultError::from)).await?;

        user.map(|u| u.encryption_salt)
            .ok_or_else(|| VaultError::NotFound(format!("user {}", user_id)))
    }
}
