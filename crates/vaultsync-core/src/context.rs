//! Per-request identity and scope.

use tokio_util::sync::CancellationToken;
use vaultsync_types::UserId;

use crate::error::{Result, VaultError};

/// The authenticated caller, as established from a verified bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    user_id: UserId,
}

impl Identity {
    /// Wraps the subject of a verified token.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    /// The authenticated user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Proof that the caller is allowed to act on a user's vault.
///
/// Only [`AuthorizationGuard`](crate::AuthorizationGuard) creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserScope {
    user_id: UserId,
}

impl UserScope {
    pub(crate) fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    /// The user whose vault may be touched.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Everything an engine call needs to know about the request it serves.
#[derive(Debug, Clone)]
pub struct RequestContext {
    scope: UserScope,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Creates a context for an authorized request.
    pub fn new(scope: UserScope, cancel: CancellationToken) -> Self {
        Self { scope, cancel }
    }

    /// The authorized scope.
    pub fn scope(&self) -> UserScope {
        self.scope
    }

    /// Shorthand for `scope().user_id()`.
    pub fn user_id(&self) -> UserId {
        self.scope.user_id
    }

    /// The request's cancellation signal.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with [`VaultError::Cancelled`] once the request was cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(VaultError::Cancelled)
        } else {
            Ok(())
        }
    }
}
