//! Sync engine: record state descriptors and record listings.
//!
//! Descriptors are read per record, not from one snapshot; two entries of a
//! response may reflect different commit points.

use std::collections::HashSet;
use std::sync::Arc;
use vaultsync_storage::VaultStore;
use vaultsync_types::{is_blank, Record, RecordState};

use crate::context::RequestContext;
use crate::error::{Result, VaultError};
use crate::run_blocking;

/// Answers reconciliation and download queries.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn VaultStore>,
    max_ids: usize,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("max_ids", &self.max_ids)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates an engine over `store`, refusing id lists above `max_ids`.
    pub fn new(store: Arc<dyn VaultStore>, max_ids: usize) -> Self {
        Self { store, max_ids }
    }

    /// Every descriptor of the caller's vault, tombstones included.
    pub async fn full_states(&self, ctx: &RequestContext) -> Result<Vec<RecordState>> {
        let store = Arc::clone(&self.store);
        let user_id = ctx.user_id();
        let states = self.read(ctx, move || Ok(store.states(user_id)?)).await?;

        tracing::debug!(user_id = %user_id, count = states.len(), "full sync");
        Ok(states)
    }

    /// Descriptors of the named records. Unknown ids are omitted and a
    /// repeated id is answered once.
    pub async fn states_for(&self, ctx: &RequestContext, ids: Vec<String>) -> Result<Vec<RecordState>> {
        let ids = self.check_ids(ids)?;

        let store = Arc::clone(&self.store);
        let user_id = ctx.user_id();
        let requested = ids.len();
        let states = self
            .read(ctx, move || Ok(store.states_by_ids(user_id, &ids)?))
            .await?;

        tracing::debug!(user_id = %user_id, requested, count = states.len(), "targeted sync");
        Ok(states)
    }

    /// The caller's live records.
    pub async fn all_records(&self, ctx: &RequestContext) -> Result<Vec<Record>> {
        let store = Arc::clone(&self.store);
        let user_id = ctx.user_id();
        self.read(ctx, move || Ok(store.live_records(user_id)?)).await
    }

    /// The named live records. Unknown ids and tombstones are omitted and a
    /// repeated id is answered once.
    pub async fn download(&self, ctx: &RequestContext, ids: Vec<String>) -> Result<Vec<Record>> {
        let ids = self.check_ids(ids)?;

        let store = Arc::clone(&self.store);
        let user_id = ctx.user_id();
        self.read(ctx, move || Ok(store.live_records_by_ids(user_id, &ids)?))
            .await
    }

    /// Validates a requested id list and drops repeats, keeping first-seen order.
    fn check_ids(&self, ids: Vec<String>) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Err(VaultError::validation("no client_side_ids"));
        }
        if ids.len() > self.max_ids {
            return Err(VaultError::validation(format!(
                "{} ids exceed the limit of {}",
                ids.len(),
                self.max_ids
            )));
        }
        if ids.iter().any(|id| is_blank(id)) {
            return Err(VaultError::validation("blank client_side_id"));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids.into_iter().filter(|id| seen.insert(id.clone())).collect())
    }

    async fn read<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        ctx.check_cancelled()?;
        let out = run_blocking(f).await?;
        ctx.check_cancelled()?;
        Ok(out)
    }
}
