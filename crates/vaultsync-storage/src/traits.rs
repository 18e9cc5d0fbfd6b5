//! Storage backend traits.
//!
//! Defines the interface that all storage backends must implement,
//! enabling pluggable storage strategies.

use crate::Result;
use std::sync::Arc;
use vaultsync_types::{NewRecord, Record, RecordState, Timestamp, User, UserId};

/// A write transaction scoped to a single user's vault.
///
/// Writes become visible to other readers only on [`commit`]. Dropping the
/// transaction without committing rolls every staged write back.
///
/// [`commit`]: VaultTransaction::commit
pub trait VaultTransaction {
    /// The user whose vault this transaction covers.
    fn user_id(&self) -> UserId;

    /// Looks up a record (live or tombstoned) by client-side id.
    ///
    /// Sees the transaction's own uncommitted writes.
    fn find(&mut self, client_side_id: &str) -> Result<Option<Record>>;

    /// Inserts a new record at version 0.
    ///
    /// Fails with [`StorageError::AlreadyExists`] when the client-side id is
    /// already taken in this vault, tombstones included.
    ///
    /// [`StorageError::AlreadyExists`]: crate::StorageError::AlreadyExists
    fn insert(&mut self, item: NewRecord, now: Timestamp) -> Result<Record>;

    /// Overwrites the mutable state of an existing record
    /// (payload, hash, version, tombstone flag, `updated_at`).
    fn replace(&mut self, record: &Record) -> Result<()>;

    /// Makes every staged write durable and visible.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Trait for vault record storage backends.
pub trait VaultStore: Send + Sync {
    /// Opens a write transaction on one user's vault.
    ///
    /// Transactions on the same vault are serialized; transactions on
    /// different vaults do not interact.
    fn begin(&self, user_id: UserId) -> Result<Box<dyn VaultTransaction + '_>>;

    /// Lists the user's live records. Tombstones are excluded.
    fn live_records(&self, user_id: UserId) -> Result<Vec<Record>>;

    /// Fetches the user's live records among `client_side_ids`.
    ///
    /// Unknown ids and tombstones are omitted.
    fn live_records_by_ids(&self, user_id: UserId, client_side_ids: &[String])
        -> Result<Vec<Record>>;

    /// Lists state descriptors for every record of the user, tombstones included.
    fn states(&self, user_id: UserId) -> Result<Vec<RecordState>>;

    /// Fetches state descriptors of the given records, tombstones included.
    ///
    /// Unknown ids are omitted.
    fn states_by_ids(&self, user_id: UserId, client_side_ids: &[String])
        -> Result<Vec<RecordState>>;

    /// Checks that the backend is reachable.
    fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Returns storage statistics.
    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats::default())
    }
}

/// Trait for the credential store holding registered users.
pub trait CredentialStore: Send + Sync {
    /// Registers a user. Fails with `AlreadyExists` when the login is taken.
    fn create_user(&self, login: &str, password_hash: &str, encryption_salt: &str) -> Result<User>;

    /// Finds a user by exact (case-sensitive) login.
    fn user_by_login(&self, login: &str) -> Result<Option<User>>;

    /// Finds a user by id.
    fn user_by_id(&self, id: UserId) -> Result<Option<User>>;
}

// Implement VaultStore for Arc<T> where T: VaultStore
impl<T: VaultStore + ?Sized> VaultStore for Arc<T> {
    fn begin(&self, user_id: UserId) -> Result<Box<dyn VaultTransaction + '_>> {
        (**self).begin(user_id)
    }

    fn live_records(&self, user_id: UserId) -> Result<Vec<Record>> {
        (**self).live_records(user_id)
    }

    fn live_records_by_ids(
        &self,
        user_id: UserId,
        client_side_ids: &[String],
    ) -> Result<Vec<Record>> {
        (**self).live_records_by_ids(user_id, client_side_ids)
    }

    fn states(&self, user_id: UserId) -> Result<Vec<RecordState>> {
        (**self).states(user_id)
    }

    fn states_by_ids(
        &self,
        user_id: UserId,
        client_side_ids: &[String],
    ) -> Result<Vec<RecordState>> {
        (**self).states_by_ids(user_id, client_side_ids)
    }

    fn ping(&self) -> Result<()> {
        (**self).ping()
    }

    fn stats(&self) -> Result<StorageStats> {
        (**self).stats()
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn create_user(&self, login: &str, password_hash: &str, encryption_salt: &str) -> Result<User> {
        (**self).create_user(login, password_hash, encryption_salt)
    }

    fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        (**self).user_by_login(login)
    }

    fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        (**self).user_by_id(id)
    }
}

/// Storage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of registered users.
    pub users: u64,
    /// Number of live records across all vaults.
    pub live_records: u64,
    /// Number of tombstones across all vaults.
    pub tombstones: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mock implementation for testing
    struct EmptyStore;

    impl VaultStore for EmptyStore {
        fn begin(&self, _user_id: UserId) -> Result<Box<dyn VaultTransaction + '_>> {
            Err(crate::StorageError::Busy("read-only".into()))
        }

        fn live_records(&self, _user_id: UserId) -> Result<Vec<Record>> {
            Ok(vec![])
        }

        fn live_records_by_ids(&self, _user_id: UserId, _ids: &[String]) -> Result<Vec<Record>> {
            Ok(vec![])
        }

        fn states(&self, _user_id: UserId) -> Result<Vec<RecordState>> {
            Ok(vec![])
        }

        fn states_by_ids(&self, _user_id: UserId, _ids: &[String]) -> Result<Vec<RecordState>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_defaults() {
        let storage = Arc::new(EmptyStore);
        assert!(storage.ping().is_ok());
        assert_eq!(storage.stats().unwrap(), StorageStats::default());
        assert!(storage.begin(UserId::new(1)).is_err());
    }
}
