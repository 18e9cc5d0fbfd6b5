//! Authorization guard.

use vaultsync_types::UserId;

use crate::context::{Identity, UserScope};
use crate::error::{Result, VaultError};

/// Checks that a request only touches the caller's own vault.
///
/// Engines never see an [`Identity`]; they take the [`UserScope`] issued here.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationGuard;

impl AuthorizationGuard {
    /// Authorizes a request whose body names `claimed` as the target user.
    pub fn authorize(&self, identity: &Identity, claimed: Option<UserId>) -> Result<UserScope> {
        let claimed = claimed.ok_or_else(|| VaultError::validation("missing user id"))?;
        if claimed != identity.user_id() {
            tracing::warn!(
                user_id = %identity.user_id(),
                claimed_user_id = %claimed,
                "cross-user request denied"
            );
            return Err(VaultError::Authorization);
        }
        Ok(UserScope::new(claimed))
    }

    /// Scope for endpoints whose target user is implied by the token.
    pub fn scope_for(&self, identity: &Identity) -> UserScope {
        UserScope::new(identity.user_id())
    }
}
