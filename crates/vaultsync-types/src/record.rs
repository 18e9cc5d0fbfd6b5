//! Vault records and the items clients submit to mutate them.

use serde::{Deserialize, Serialize};

use crate::{ServerId, Timestamp, UserId};

/// One encrypted vault item as seen by the server.
///
/// `payload` is opaque client ciphertext (already text-encoded by the
/// client). The server stores and returns it verbatim, together with the
/// client-supplied content `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Server-assigned identifier.
    pub server_id: ServerId,
    /// Client-chosen identifier, unique per user. The sync key.
    pub client_side_id: String,
    /// Owning user.
    #[serde(skip_serializing)]
    pub user_id: UserId,
    /// Opaque ciphertext plus client metadata.
    pub payload: String,
    /// Hex content hash claimed by the client at the last accepted write.
    pub hash: String,
    /// Monotonic version, bumped on every accepted mutation.
    pub version: u64,
    /// Tombstone flag.
    pub deleted: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the last accepted mutation.
    pub updated_at: Timestamp,
}

impl Record {
    /// Returns the sync descriptor for this record.
    pub fn state(&self) -> RecordState {
        RecordState {
            client_side_id: self.client_side_id.clone(),
            hash: self.hash.clone(),
            version: self.version,
            deleted: self.deleted,
            updated_at: self.updated_at,
        }
    }

    /// Returns true unless the record is a tombstone.
    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    /// Applies an accepted update: new content, version bump.
    pub fn apply_update(&mut self, payload: String, hash: String, now: Timestamp) {
        self.payload = payload;
        self.hash = hash;
        self.version += 1;
        self.updated_at = now.not_before(self.updated_at);
    }

    /// Turns the record into a tombstone, keeping its id and bumping its version.
    pub fn apply_delete(&mut self, now: Timestamp) {
        self.deleted = true;
        self.version += 1;
        self.updated_at = now.not_before(self.updated_at);
    }
}

/// Record State Descriptor: the unit of sync exchange. Carries no payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordState {
    /// Client-side identifier.
    pub client_side_id: String,
    /// Current content hash.
    pub hash: String,
    /// Current version.
    pub version: u64,
    /// Tombstone flag.
    pub deleted: bool,
    /// Time of the last accepted mutation.
    pub updated_at: Timestamp,
}

/// An item of an upload batch.
///
/// Field order is part of the integrity envelope's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    /// Client-side identifier of the record to create.
    pub client_side_id: String,
    /// Opaque payload.
    pub payload: String,
    /// Client content hash.
    pub hash: String,
}

/// An item of an update batch.
///
/// Field order is part of the integrity envelope's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUpdate {
    /// Client-side identifier of the record to update.
    pub client_side_id: String,
    /// New opaque payload.
    pub payload: String,
    /// New client content hash.
    pub hash: String,
    /// The version the client last saw. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// An item of a delete batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDeletion {
    /// Client-side identifier of the record to tombstone.
    pub client_side_id: String,
    /// The version the client last saw. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            server_id: ServerId::new(1),
            client_side_id: "c1".into(),
            user_id: UserId::new(10),
            payload: "P1".into(),
            hash: "h1".into(),
            version: 0,
            deleted: false,
            created_at: Timestamp::from_millis(1_000),
            updated_at: Timestamp::from_millis(1_000),
        }
    }

    #[test]
    fn update_bumps_version_and_keeps_time_monotonic() {
        let mut r = record();
        r.apply_update("P2".into(), "h2".into(), Timestamp::from_millis(500));
        assert_eq!(r.version, 1);
        assert_eq!(r.payload, "P2");
        assert_eq!(r.hash, "h2");
        assert_eq!(r.updated_at, Timestamp::from_millis(1_000));
    }

    #[test]
    fn delete_keeps_identity_and_bumps_version() {
        let mut r = record();
        r.apply_delete(Timestamp::from_millis(2_000));
        assert!(r.deleted);
        assert!(!r.is_live());
        assert_eq!(r.version, 1);
        assert_eq!(r.client_side_id, "c1");
        assert_eq!(r.state().updated_at, Timestamp::from_millis(2_000));
    }

    #[test]
    fn record_json_hides_owner() {
        let json = serde_json::to_value(record()).unwrap();
        assert!(json.get("user_id").is_none());
        assert_eq!(json["client_side_id"], "c1");
        assert_eq!(json["version"], 0);
    }

    #[test]
    fn update_without_version_deserializes_to_none() {
        let item: RecordUpdate =
            serde_json::from_str(r#"{"client_side_id":"c1","payload":"p","hash":"h"}"#).unwrap();
        assert_eq!(item.version, None);
    }
}
