//! SQLite storage backend.

use crate::traits::{CredentialStore, StorageStats, VaultStore, VaultTransaction};
use crate::{Result, StorageError};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ToSql};
use std::path::Path;
use std::time::Duration;
use vaultsync_types::{NewRecord, Record, RecordState, ServerId, Timestamp, User, UserId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    login TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    encryption_salt TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    server_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    client_side_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    hash TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (user_id, client_side_id)
);
";

const RECORD_COLUMNS: &str =
    "server_id, user_id, client_side_id, payload, hash, version, deleted, created_at, updated_at";

const STATE_COLUMNS: &str = "client_side_id, hash, version, deleted, updated_at";

/// Ids per `IN (...)` query, well under SQLite's bound-parameter limit.
const ID_CHUNK: usize = 500;

/// SQLite-backed store for vault records and credentials.
///
/// A single connection is shared behind a mutex; a transaction holds it
/// from `BEGIN IMMEDIATE` until commit or drop.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) a database file in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(map_err)?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(map_err)?;
        tracing::debug!(path = %path.as_ref().display(), journal_mode = %mode, "opened sqlite store");
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(map_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(map_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_err)?;
        conn.execute_batch(SCHEMA).map_err(map_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_chunked<T>(
        &self,
        user_id: UserId,
        client_side_ids: &[String],
        columns: &str,
        live_only: bool,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock();
        let uid = user_id.get();
        let mut out = Vec::new();

        for chunk in client_side_ids.chunks(ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM records WHERE user_id = ? {} AND client_side_id IN ({}) ORDER BY server_id",
                columns,
                if live_only { "AND deleted = 0" } else { "" },
                placeholders,
            );

            let mut params: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() + 1);
            params.push(&uid);
            params.extend(chunk.iter().map(|id| id as &dyn ToSql));

            let mut stmt = conn.prepare_cached(&sql).map_err(map_err)?;
            let rows = stmt.query_map(params.as_slice(), map).map_err(map_err)?;
            for row in rows {
                out.push(row.map_err(map_err)?);
            }
        }

        Ok(out)
    }
}

fn map_err(err: rusqlite::Error) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StorageError::Busy(err.to_string())
        }
        _ => match err {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => StorageError::Corruption(err.to_string()),
            _ => StorageError::Database(err.to_string()),
        },
    }
}

/// Maps a unique-constraint violation to `AlreadyExists(key)`.
fn map_insert_err(err: rusqlite::Error, key: impl FnOnce() -> String) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StorageError::AlreadyExists(key())
        }
        _ => map_err(err),
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        server_id: ServerId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        client_side_id: row.get(2)?,
        payload: row.get(3)?,
        hash: row.get(4)?,
        version: row.get(5)?,
        deleted: row.get(6)?,
        created_at: Timestamp::from_millis(row.get(7)?),
        updated_at: Timestamp::from_millis(row.get(8)?),
    })
}

fn state_from_row(row: &Row<'_>) -> rusqlite::Result<RecordState> {
    Ok(RecordState {
        client_side_id: row.get(0)?,
        hash: row.get(1)?,
        version: row.get(2)?,
        deleted: row.get(3)?,
        updated_at: Timestamp::from_millis(row.get(4)?),
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get(0)?),
        login: row.get(1)?,
        password_hash: row.get(2)?,
        encryption_salt: row.get(3)?,
    })
}

struct SqliteTransaction<'a> {
    user_id: UserId,
    conn: MutexGuard<'a, Connection>,
    committed: bool,
}

impl VaultTransaction for SqliteTransaction<'_> {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn find(&mut self, client_side_id: &str) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM records WHERE user_id = ?1 AND client_side_id = ?2",
            RECORD_COLUMNS
        );
        self.conn
            .prepare_cached(&sql)
            .and_then(|mut stmt| {
                stmt.query_row(
                    rusqlite::params![self.user_id.get(), client_side_id],
                    record_from_row,
                )
                .optional()
            })
            .map_err(map_err)
    }

    fn insert(&mut self, item: NewRecord, now: Timestamp) -> Result<Record> {
        self.conn
            .execute(
                "INSERT INTO records (user_id, client_side_id, payload, hash, version, deleted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?5)",
                rusqlite::params![
                    self.user_id.get(),
                    item.client_side_id,
                    item.payload,
                    item.hash,
                    now.as_millis(),
                ],
            )
            .map_err(|e| map_insert_err(e, || item.client_side_id.clone()))?;

        let server_id = u64::try_from(self.conn.last_insert_rowid())
            .map_err(|_| StorageError::Corruption("negative rowid".into()))?;

        Ok(Record {
            server_id: ServerId::new(server_id),
            client_side_id: item.client_side_id,
            user_id: self.user_id,
            payload: item.payload,
            hash: item.hash,
            version: 0,
            deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    fn replace(&mut self, record: &Record) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE records SET payload = ?1, hash = ?2, version = ?3, deleted = ?4, updated_at = ?5
                 WHERE server_id = ?6 AND user_id = ?7",
                rusqlite::params![
                    record.payload,
                    record.hash,
                    record.version,
                    record.deleted,
                    record.updated_at.as_millis(),
                    record.server_id.get(),
                    self.user_id.get(),
                ],
            )
            .map_err(map_err)?;

        if changed == 0 {
            return Err(StorageError::NotFound(record.client_side_id.clone()));
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT").map_err(map_err)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(user_id = %self.user_id, error = %e, "rollback failed");
        }
    }
}

impl VaultStore for SqliteStore {
    fn begin(&self, user_id: UserId) -> Result<Box<dyn VaultTransaction + '_>> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE").map_err(map_err)?;
        Ok(Box::new(SqliteTransaction {
            user_id,
            conn,
            committed: false,
        }))
    }

    fn live_records(&self, user_id: UserId) -> Result<Vec<Record>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM records WHERE user_id = ?1 AND deleted = 0 ORDER BY server_id",
            RECORD_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(map_err)?;
        let rows = stmt
            .query_map([user_id.get()], record_from_row)
            .map_err(map_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_err)
    }

    fn live_records_by_ids(
        &self,
        user_id: UserId,
        client_side_ids: &[String],
    ) -> Result<Vec<Record>> {
        self.query_chunked(user_id, client_side_ids, RECORD_COLUMNS, true, record_from_row)
    }

    fn states(&self, user_id: UserId) -> Result<Vec<RecordState>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM records WHERE user_id = ?1 ORDER BY server_id",
            STATE_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(map_err)?;
        let rows = stmt
            .query_map([user_id.get()], state_from_row)
            .map_err(map_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_err)
    }

    fn states_by_ids(
        &self,
        user_id: UserId,
        client_side_ids: &[String],
    ) -> Result<Vec<RecordState>> {
        self.query_chunked(user_id, client_side_ids, STATE_COLUMNS, false, state_from_row)
    }

    fn ping(&self) -> Result<()> {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(map_err)
    }

    fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM records WHERE deleted = 0),
                (SELECT COUNT(*) FROM records WHERE deleted = 1)",
            [],
            |row| {
                Ok(StorageStats {
                    users: row.get(0)?,
                    live_records: row.get(1)?,
                    tombstones: row.get(2)?,
                })
            },
        )
        .map_err(map_err)
    }
}

impl CredentialStore for SqliteStore {
    fn create_user(&self, login: &str, password_hash: &str, encryption_salt: &str) -> Result<User> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (login, password_hash, encryption_salt) VALUES (?1, ?2, ?3)",
            rusqlite::params![login, password_hash, encryption_salt],
        )
        .map_err(|e| map_insert_err(e, || format!("login '{}'", login)))?;

        let id = u64::try_from(conn.last_insert_rowid())
            .map_err(|_| StorageError::Corruption("negative rowid".into()))?;

        Ok(User {
            id: UserId::new(id),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            encryption_salt: encryption_salt.to_string(),
        })
    }

    fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, login, password_hash, encryption_salt FROM users WHERE login = ?1",
                [login],
                user_from_row,
            )
            .optional()
            .map_err(map_err)
    }

    fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, login, password_hash, encryption_salt FROM users WHERE id = ?1",
                [id.get()],
                user_from_row,
            )
            .optional()
            .map_err(map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(id: &str) -> NewRecord {
        NewRecord {
            client_side_id: id.into(),
            payload: format!("payload-{}", id),
            hash: format!("hash-{}", id),
        }
    }

    fn store_with_user() -> (SqliteStore, UserId) {
        let store = SqliteStore::in_memory().unwrap();
        let user = store.create_user("alice", "phc", "salt").unwrap();
        (store, user.id)
    }

    #[test]
    fn test_insert_commit_and_list() {
        let (store, user) = store_with_user();

        let mut tx = store.begin(user).unwrap();
        let first = tx.insert(item("c1"), Timestamp::from_millis(5)).unwrap();
        tx.insert(item("c2"), Timestamp::from_millis(5)).unwrap();
        tx.commit().unwrap();

        let records = store.live_records(user).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], first);
        assert_eq!(records[0].created_at, Timestamp::from_millis(5));
    }

    #[test]
    fn test_rollback_on_drop() {
        let (store, user) = store_with_user();
        {
            let mut tx = store.begin(user).unwrap();
            tx.insert(item("c1"), Timestamp::now()).unwrap();
        }
        assert!(store.live_records(user).unwrap().is_empty());

        // The connection is usable again after the rollback.
        let mut tx = store.begin(user).unwrap();
        tx.insert(item("c1"), Timestamp::now()).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.live_records(user).unwrap().len(), 1);
    }

    #[test]
    fn test_unique_client_side_id() {
        let (store, user) = store_with_user();
        let mut tx = store.begin(user).unwrap();
        tx.insert(item("c1"), Timestamp::now()).unwrap();
        let err = tx.insert(item("c1"), Timestamp::now()).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(id) if id == "c1"));
    }

    #[test]
    fn test_replace_and_states() {
        let (store, user) = store_with_user();
        let mut tx = store.begin(user).unwrap();
        tx.insert(item("c1"), Timestamp::from_millis(10)).unwrap();
        tx.insert(item("c2"), Timestamp::from_millis(10)).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin(user).unwrap();
        let mut record = tx.find("c2").unwrap().unwrap();
        record.apply_delete(Timestamp::from_millis(20));
        tx.replace(&record).unwrap();
        assert!(tx.find("c2").unwrap().unwrap().deleted);
        tx.commit().unwrap();

        let ids = vec!["c1".to_string(), "c2".to_string(), "cX".to_string()];
        let live = store.live_records_by_ids(user, &ids).unwrap();
        assert_eq!(live.len(), 1);

        let states = store.states_by_ids(user, &ids).unwrap();
        assert_eq!(states.len(), 2);
        let c2 = states.iter().find(|s| s.client_side_id == "c2").unwrap();
        assert!(c2.deleted);
        assert_eq!(c2.version, 1);
        assert_eq!(c2.updated_at, Timestamp::from_millis(20));

        assert_eq!(
            store.stats().unwrap(),
            StorageStats {
                users: 1,
                live_records: 1,
                tombstones: 1
            }
        );
    }

    #[test]
    fn test_credentials() {
        let (store, user) = store_with_user();
        let err = store.create_user("alice", "x", "y").unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        let found = store.user_by_login("alice").unwrap().unwrap();
        assert_eq!(found.id, user);
        assert!(store.user_by_login("ALICE").unwrap().is_none());
        assert_eq!(store.user_by_id(user).unwrap().unwrap().login, "alice");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");

        let user = {
            let store = SqliteStore::open(&path).unwrap();
            let user = store.create_user("bob", "phc", "salt").unwrap();
            let mut tx = store.begin(user.id).unwrap();
            tx.insert(item("c1"), Timestamp::now()).unwrap();
            tx.commit().unwrap();
            user.id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.ping().is_ok());
        assert_eq!(store.live_records(user).unwrap().len(), 1);
    }
}
