//! In-memory storage backend.

use crate::traits::{CredentialStore, StorageStats, VaultStore, VaultTransaction};
use crate::{Result, StorageError};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vaultsync_types::{NewRecord, Record, RecordState, ServerId, Timestamp, User, UserId};

/// One user's records, keyed by client-side id.
#[derive(Debug, Default)]
struct UserVault {
    records: HashMap<String, Record>,
}

/// Thread-safe in-memory store for vault records and credentials.
///
/// Each vault sits behind its own mutex; a transaction holds that mutex
/// until it commits or is dropped, which serializes writers of the same
/// user and lets different users proceed independently.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Last issued record id.
    next_record_id: AtomicU64,

    /// Last issued user id.
    next_user_id: AtomicU64,

    /// Vaults by owner.
    vaults: RwLock<HashMap<UserId, Arc<Mutex<UserVault>>>>,

    /// Users by ID.
    users: RwLock<HashMap<UserId, User>>,

    /// Login to user ID mapping.
    login_index: RwLock<HashMap<String, UserId>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn vault(&self, user_id: UserId) -> Arc<Mutex<UserVault>> {
        if let Some(vault) = self.vaults.read().get(&user_id) {
            return Arc::clone(vault);
        }
        Arc::clone(self.vaults.write().entry(user_id).or_default())
    }

    fn existing_vault(&self, user_id: UserId) -> Option<Arc<Mutex<UserVault>>> {
        self.vaults.read().get(&user_id).cloned()
    }

    fn read_vault<T>(&self, user_id: UserId, f: impl FnOnce(&UserVault) -> T) -> Option<T> {
        let vault = self.existing_vault(user_id)?;
        let guard = vault.lock();
        Some(f(&guard))
    }
}

/// A transaction holding the vault lock, with writes staged until commit.
struct MemoryTransaction<'a> {
    user_id: UserId,
    vault: ArcMutexGuard<RawMutex, UserVault>,
    staged: HashMap<String, Record>,
    next_record_id: &'a AtomicU64,
}

impl VaultTransaction for MemoryTransaction<'_> {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn find(&mut self, client_side_id: &str) -> Result<Option<Record>> {
        Ok(self
            .staged
            .get(client_side_id)
            .or_else(|| self.vault.records.get(client_side_id))
            .cloned())
    }

    fn insert(&mut self, item: NewRecord, now: Timestamp) -> Result<Record> {
        if self.find(&item.client_side_id)?.is_some() {
            return Err(StorageError::AlreadyExists(item.client_side_id));
        }

        let id = self.next_record_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = Record {
            server_id: ServerId::new(id),
            client_side_id: item.client_side_id,
            user_id: self.user_id,
            payload: item.payload,
            hash: item.hash,
            version: 0,
            deleted: false,
            created_at: now,
            updated_at: now,
        };

        self.staged
            .insert(record.client_side_id.clone(), record.clone());
        Ok(record)
    }

    fn replace(&mut self, record: &Record) -> Result<()> {
        let current = self
            .find(&record.client_side_id)?
            .ok_or_else(|| StorageError::NotFound(record.client_side_id.clone()))?;
        if current.server_id != record.server_id {
            return Err(StorageError::NotFound(record.client_side_id.clone()));
        }

        self.staged
            .insert(record.client_side_id.clone(), record.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            mut vault, staged, ..
        } = *self;
        vault.records.extend(staged);
        Ok(())
    }
}

impl VaultStore for MemoryStore {
    fn begin(&self, user_id: UserId) -> Result<Box<dyn VaultTransaction + '_>> {
        let vault = self.vault(user_id).lock_arc();
        Ok(Box::new(MemoryTransaction {
            user_id,
            vault,
            staged: HashMap::new(),
            next_record_id: &self.next_record_id,
        }))
    }

    fn live_records(&self, user_id: UserId) -> Result<Vec<Record>> {
        let mut records = self
            .read_vault(user_id, |vault| {
                vault
                    .records
                    .values()
                    .filter(|r| r.is_live())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.server_id);
        Ok(records)
    }

    fn live_records_by_ids(
        &self,
        user_id: UserId,
        client_side_ids: &[String],
    ) -> Result<Vec<Record>> {
        Ok(self
            .read_vault(user_id, |vault| {
                client_side_ids
                    .iter()
                    .filter_map(|id| vault.records.get(id))
                    .filter(|r| r.is_live())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn states(&self, user_id: UserId) -> Result<Vec<RecordState>> {
        let mut records = self
            .read_vault(user_id, |vault| {
                vault.records.values().cloned().collect::<Vec<_>>()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.server_id);
        Ok(records.iter().map(Record::state).collect())
    }

    fn states_by_ids(
        &self,
        user_id: UserId,
        client_side_ids: &[String],
    ) -> Result<Vec<RecordState>> {
        Ok(self
            .read_vault(user_id, |vault| {
                client_side_ids
                    .iter()
                    .filter_map(|id| vault.records.get(id))
                    .map(Record::state)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn stats(&self) -> Result<StorageStats> {
        let vaults: Vec<_> = self.vaults.read().values().cloned().collect();
        let mut stats = StorageStats {
            users: self.users.read().len() as u64,
            ..StorageStats::default()
        };
        for vault in vaults {
            for record in vault.lock().records.values() {
                if record.deleted {
                    stats.tombstones += 1;
                } else {
                    stats.live_records += 1;
                }
            }
        }
        Ok(stats)
    }
}

impl CredentialStore for MemoryStore {
    fn create_user(&self, login: &str, password_hash: &str, encryption_salt: &str) -> Result<User> {
        let mut index = self.login_index.write();
        if index.contains_key(login) {
            return Err(StorageError::AlreadyExists(format!("login '{}'", login)));
        }

        let id = UserId::new(self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1);
        let user = User {
            id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            encryption_salt: encryption_salt.to_string(),
        };

        index.insert(user.login.clone(), id);
        self.users.write().insert(id, user.clone());
        Ok(user)
    }

    fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        let Some(id) = self.login_index.read().get(login).copied() else {
            return Ok(None);
        };
        self.user_by_id(id)
    }

    fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn item(id: &str) -> NewRecord {
        NewRecord {
            client_side_id: id.into(),
            payload: format!("payload-{}", id),
            hash: format!("hash-{}", id),
        }
    }

    fn seed(store: &MemoryStore, user: UserId, ids: &[&str]) {
        let mut tx = store.begin(user).unwrap();
        for id in ids {
            tx.insert(item(id), Timestamp::from_millis(1_000)).unwrap();
        }
        tx.commit().unwrap();
    }

    #[test]
    fn test_insert_and_commit() {
        let store = MemoryStore::new();
        let user = UserId::new(1);
        seed(&store, user, &["c1", "c2"]);

        let records = store.live_records(user).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].client_side_id, "c1");
        assert_eq!(records[0].version, 0);
        assert!(records[0].server_id < records[1].server_id);
    }

    #[test]
    fn test_drop_rolls_back() {
        let store = MemoryStore::new();
        let user = UserId::new(1);
        {
            let mut tx = store.begin(user).unwrap();
            tx.insert(item("c1"), Timestamp::now()).unwrap();
        }
        assert!(store.live_records(user).unwrap().is_empty());
        assert!(store.states(user).unwrap().is_empty());
    }

    #[test]
    fn test_insert_conflicts_with_staged_and_committed() {
        let store = MemoryStore::new();
        let user = UserId::new(1);
        seed(&store, user, &["c1"]);

        let mut tx = store.begin(user).unwrap();
        assert!(matches!(
            tx.insert(item("c1"), Timestamp::now()),
            Err(StorageError::AlreadyExists(_))
        ));
        tx.insert(item("c2"), Timestamp::now()).unwrap();
        assert!(matches!(
            tx.insert(item("c2"), Timestamp::now()),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_tombstones_hidden_from_listing_but_in_states() {
        let store = MemoryStore::new();
        let user = UserId::new(1);
        seed(&store, user, &["c1", "c2"]);

        let mut tx = store.begin(user).unwrap();
        let mut record = tx.find("c2").unwrap().unwrap();
        record.apply_delete(Timestamp::from_millis(2_000));
        tx.replace(&record).unwrap();
        tx.commit().unwrap();

        let live = store.live_records(user).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].client_side_id, "c1");

        let ids = vec!["c2".to_string()];
        assert!(store.live_records_by_ids(user, &ids).unwrap().is_empty());
        let states = store.states_by_ids(user, &ids).unwrap();
        assert_eq!(states.len(), 1);
        assert!(states[0].deleted);
        assert_eq!(states[0].version, 1);

        let stats = store.stats().unwrap();
        assert_eq!(stats.live_records, 1);
        assert_eq!(stats.tombstones, 1);
    }

    #[test]
    fn test_replace_unknown_record() {
        let store = MemoryStore::new();
        let user = UserId::new(1);
        seed(&store, user, &["c1"]);

        let mut tx = store.begin(user).unwrap();
        let mut record = tx.find("c1").unwrap().unwrap();
        record.client_side_id = "missing".into();
        assert!(matches!(tx.replace(&record), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_vaults_are_isolated() {
        let store = MemoryStore::new();
        seed(&store, UserId::new(1), &["c1"]);
        seed(&store, UserId::new(2), &["c1"]);

        assert_eq!(store.live_records(UserId::new(1)).unwrap().len(), 1);
        assert_eq!(store.live_records(UserId::new(2)).unwrap().len(), 1);
        assert!(store.states(UserId::new(3)).unwrap().is_empty());
    }

    #[test]
    fn test_same_user_transactions_are_serialized() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new(1);
        seed(&store, user, &["c1"]);

        let tx = store.begin(user).unwrap();
        let other = Arc::clone(&store);
        let handle = thread::spawn(move || {
            // Blocks until the first transaction is released.
            let mut tx = other.begin(user).unwrap();
            tx.find("c1").unwrap().unwrap().version
        });

        thread::sleep(Duration::from_millis(20));
        let mut tx = tx;
        let mut record = tx.find("c1").unwrap().unwrap();
        record.apply_update("p".into(), "h".into(), Timestamp::now());
        tx.replace(&record).unwrap();
        tx.commit().unwrap();

        assert_eq!(handle.join().unwrap(), 1);
    }

    #[test]
    fn test_credentials() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice", "phc", "salt").unwrap();
        assert_eq!(alice.id, UserId::new(1));

        assert!(matches!(
            store.create_user("alice", "phc", "salt"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(store.user_by_login("Alice").unwrap().is_none());
        assert_eq!(store.user_by_login("alice").unwrap().unwrap(), alice);
        assert_eq!(store.user_by_id(alice.id).unwrap().unwrap().encryption_salt, "salt");
    }
}
