//! Mutation engine: the version protocol.
//!
//! Each batch runs in one per-user transaction. Either every item commits
//! or none does; the first failing item aborts the batch and is named in
//! the error.

use std::sync::Arc;
use vaultsync_storage::{StorageError, VaultStore, VaultTransaction};
use vaultsync_types::{is_blank, NewRecord, Record, RecordDeletion, RecordState, RecordUpdate, Timestamp};

use crate::context::RequestContext;
use crate::error::{Result, VaultError};
use crate::run_blocking;

/// Executes upload, update, and delete batches.
#[derive(Clone)]
pub struct MutationEngine {
    store: Arc<dyn VaultStore>,
    max_batch_items: usize,
}

impl std::fmt::Debug for MutationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationEngine")
            .field("max_batch_items", &self.max_batch_items)
            .finish_non_exhaustive()
    }
}

impl MutationEngine {
    /// Creates an engine over `store`, refusing batches above `max_batch_items`.
    pub fn new(store: Arc<dyn VaultStore>, max_batch_items: usize) -> Self {
        Self {
            store,
            max_batch_items,
        }
    }

    /// Creates records at version 0.
    ///
    /// Fails with [`VaultError::UniquenessConflict`] if any client-side id is
    /// already taken, tombstones included.
    pub async fn upload(&self, ctx: &RequestContext, items: Vec<NewRecord>) -> Result<Vec<RecordState>> {
        self.check_batch(items.len())?;
        for item in &items {
            check_item(&item.client_side_id, &item.hash)?;
        }

        let user_id = ctx.user_id();
        let store = Arc::clone(&self.store);
        let ctx = ctx.clone();
        let states = run_blocking(move || {
            let mut tx = store.begin(ctx.user_id())?;
            let now = Timestamp::now();
            let mut states = Vec::with_capacity(items.len());

            for item in items {
                ctx.check_cancelled()?;
                let client_side_id = item.client_side_id.clone();
                let record = tx.insert(item, now).map_err(|e| match e {
                    StorageError::AlreadyExists(_) => VaultError::UniquenessConflict(client_side_id),
                    other => other.into(),
                })?;
                states.push(record.state());
            }

            finish(tx, &ctx)?;
            Ok(states)
        })
        .await?;

        tracing::info!(user_id = %user_id, count = states.len(), "records uploaded");
        Ok(states)
    }

    /// Replaces payload and hash of live records whose version matches.
    pub async fn update(&self, ctx: &RequestContext, items: Vec<RecordUpdate>) -> Result<Vec<RecordState>> {
        self.check_batch(items.len())?;
        for item in &items {
            check_item(&item.client_side_id, &item.hash)?;
            require_version(&item.client_side_id, item.version)?;
        }

        let user_id = ctx.user_id();
        let store = Arc::clone(&self.store);
        let ctx = ctx.clone();
        let states = run_blocking(move || {
            let mut tx = store.begin(ctx.user_id())?;
            let now = Timestamp::now();
            let mut states = Vec::with_capacity(items.len());

            for item in items {
                ctx.check_cancelled()?;
                let submitted = require_version(&item.client_side_id, item.version)?;
                let mut record = checked_live(tx.as_mut(), &item.client_side_id, submitted)?;
                record.apply_update(item.payload, item.hash, now);
                tx.replace(&record)?;
                states.push(record.state());
            }

            finish(tx, &ctx)?;
            Ok(states)
        })
        .await?;

        tracing::info!(user_id = %user_id, count = states.len(), "records updated");
        Ok(states)
    }

    /// Tombstones live records whose version matches.
    pub async fn delete(&self, ctx: &RequestContext, items: Vec<RecordDeletion>) -> Result<Vec<RecordState>> {
        self.check_batch(items.len())?;
        for item in &items {
            if is_blank(&item.client_side_id) {
                return Err(VaultError::validation("blank client_side_id"));
            }
            require_version(&item.client_side_id, item.version)?;
        }

        let user_id = ctx.user_id();
        let store = Arc::clone(&self.store);
        let ctx = ctx.clone();
        let states = run_blocking(move || {
            let mut tx = store.begin(ctx.user_id())?;
            let now = Timestamp::now();
            let mut states = Vec::with_capacity(items.len());

            for item in items {
                ctx.check_cancelled()?;
                let submitted = require_version(&item.client_side_id, item.version)?;
                let mut record = checked_live(tx.as_mut(), &item.client_side_id, submitted)?;
                record.apply_delete(now);
                tx.replace(&record)?;
                states.push(record.state());
            }

            finish(tx, &ctx)?;
            Ok(states)
        })
        .await?;

        tracing::info!(user_id = %user_id, count = states.len(), "records deleted");
        Ok(states)
    }

    fn check_batch(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(VaultError::validation("no data"));
        }
        if len > self.max_batch_items {
            return Err(VaultError::validation(format!(
                "batch of {} items exceeds the limit of {}",
                len, self.max_batch_items
            )));
        }
        Ok(())
    }
}

fn check_item(client_side_id: &str, hash: &str) -> Result<()> {
    if is_blank(client_side_id) {
        return Err(VaultError::validation("blank client_side_id"));
    }
    if is_blank(hash) {
        return Err(VaultError::validation(format!("missing hash for {}", client_side_id)));
    }
    Ok(())
}

fn require_version(client_side_id: &str, version: Option<u64>) -> Result<u64> {
    version.ok_or_else(|| VaultError::validation(format!("missing version for {}", client_side_id)))
}

/// Loads a live record and checks the client saw its current version.
fn checked_live(tx: &mut (dyn VaultTransaction + '_), client_side_id: &str, submitted: u64) -> Result<Record> {
    let record = tx
        .find(client_side_id)?
        .filter(Record::is_live)
        .ok_or_else(|| VaultError::NotFound(client_side_id.to_string()))?;

    if record.version != submitted {
        return Err(VaultError::VersionConflict {
            client_side_id: client_side_id.to_string(),
            stored: record.version,
            submitted,
        });
    }
    Ok(record)
}

/// Commits unless the request was cancelled; dropping `tx` rolls back.
fn finish(tx: Box<dyn VaultTransaction + '_>, ctx: &RequestContext) -> Result<()> {
    if ctx.check_cancelled().is_err() {
        tracing::debug!(user_id = %tx.user_id(), "request cancelled, rolling back");
        return Err(VaultError::Cancelled);
    }
    tx.commit()?;
    Ok(())
}
