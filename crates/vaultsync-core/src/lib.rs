//! # Vaultsync Core
//!
//! The vault synchronization engine. Requests reach it already
//! authenticated (an [`Identity`]) and flow through:
//!
//! 1. [`IntegrityGate`]: checks the keyed MAC over a mutating batch before
//!    any state is touched.
//! 2. [`AuthorizationGuard`]: turns the identity plus the user id a request
//!    claims into a [`UserScope`], the only handle the engines accept.
//! 3. [`MutationEngine`]: upload, update, and delete batches, each in one
//!    per-user transaction under the version protocol.
//! 4. [`SyncEngine`]: record state descriptors for full and targeted
//!    reconciliation, plus record listings.
//!
//! [`AccountService`] covers registration, login, and the encryption salt.
//! Every failure is a [`VaultError`] kind; mapping kinds to transport
//! statuses is left to the caller.

mod accounts;
mod context;
mod engine;
mod error;
mod guard;
mod integrity;
mod request;
mod sync;

pub use accounts::{AccountService, Registration, MIN_PASSWORD_LEN};
pub use context::{Identity, RequestContext, UserScope};
pub use engine::MutationEngine;
pub use error::{AuthFailure, Result, VaultError};
pub use guard::AuthorizationGuard;
pub use integrity::{HasherPool, HasherPoolStats, IntegrityGate, PooledHasher, SignedEnvelope};
pub use request::{DeleteRequest, IdsRequest, UpdateRequest, UploadRequest, UserScoped};
pub use sync::SyncEngine;

/// Default cap on items per batch or id list.
pub const DEFAULT_MAX_BATCH_ITEMS: usize = 1000;

/// Runs a blocking store call on the blocking pool.
///
/// Panics inside `f` are resumed on the calling task.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(VaultError::Cancelled),
    }
}
