//! Request bodies of the batch endpoints.

use serde::{Deserialize, Serialize};
use vaultsync_types::{NewRecord, RecordDeletion, RecordUpdate, UserId};

use crate::error::{Result, VaultError};
use crate::integrity::SignedEnvelope;

/// A request body that names the user whose vault it targets.
pub trait UserScoped {
    /// The `user_id` field, if sent.
    fn user_id(&self) -> Option<UserId>;

    /// Number of list items.
    fn item_count(&self) -> usize;

    /// The optional `length` field.
    fn declared_length(&self) -> Option<usize>;

    /// Checks `length` against the list when present.
    fn check_length(&self) -> Result<()> {
        match self.declared_length() {
            Some(declared) if declared != self.item_count() => Err(VaultError::validation(format!(
                "length {} does not match {} items",
                declared,
                self.item_count()
            ))),
            _ => Ok(()),
        }
    }
}

/// `POST /data/` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Target user.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Records to create.
    #[serde(default)]
    pub payload_list: Vec<NewRecord>,
    /// Optional item count.
    #[serde(default)]
    pub length: Option<usize>,
    /// Hex HMAC-SHA256 of `payload_list`.
    #[serde(default)]
    pub hash: String,
}

/// `PUT /data/update` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Target user.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Version-checked updates.
    #[serde(default)]
    pub private_data_updates: Vec<RecordUpdate>,
    /// Optional item count.
    #[serde(default)]
    pub length: Option<usize>,
    /// Hex HMAC-SHA256 of `private_data_updates`.
    #[serde(default)]
    pub hash: String,
}

/// `DELETE /data/delete` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Target user.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Version-checked deletions.
    #[serde(default)]
    pub delete_entries: Vec<RecordDeletion>,
    /// Optional item count.
    #[serde(default)]
    pub length: Option<usize>,
}

/// `POST /data/download` and `POST /sync/specific` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdsRequest {
    /// Target user.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Client-side ids to look up.
    #[serde(default)]
    pub client_side_ids: Vec<String>,
    /// Optional item count.
    #[serde(default)]
    pub length: Option<usize>,
}

macro_rules! user_scoped {
    ($ty:ty, $list:ident) => {
        impl UserScoped for $ty {
            fn user_id(&self) -> Option<UserId> {
                self.user_id
            }

            fn item_count(&self) -> usize {
                self.$list.len()
            }

            fn declared_length(&self) -> Option<usize> {
                self.length
            }
        }
    };
}

user_scoped!(UploadRequest, payload_list);
user_scoped!(UpdateRequest, private_data_updates);
user_scoped!(DeleteRequest, delete_entries);
user_scoped!(IdsRequest, client_side_ids);

impl SignedEnvelope for UploadRequest {
    type Item = NewRecord;

    fn items(&self) -> &[NewRecord] {
        &self.payload_list
    }

    fn hash(&self) -> &str {
        &self.hash
    }
}

impl SignedEnvelope for UpdateRequest {
    type Item = RecordUpdate;

    fn items(&self) -> &[RecordUpdate] {
        &self.private_data_updates
    }

    fn hash(&self) -> &str {
        &self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload() {
        let req: UploadRequest = serde_json::from_str(
            r#"{"user_id":1,"payload_list":[{"client_side_id":"c1","payload":"P1","hash":"h1"}],"length":1,"hash":"ab"}"#,
        )
        .unwrap();
        assert_eq!(req.user_id, Some(UserId::new(1)));
        assert_eq!(req.items().len(), 1);
        assert!(req.check_length().is_ok());
    }

    #[test]
    fn test_length_mismatch() {
        let req = IdsRequest {
            user_id: Some(UserId::new(1)),
            client_side_ids: vec!["a".into()],
            length: Some(2),
        };
        assert!(matches!(req.check_length(), Err(VaultError::Validation(_))));

        let req = IdsRequest {
            length: None,
            ..req
        };
        assert!(req.check_length().is_ok());
    }

    #[test]
    fn test_missing_fields_default() {
        let req: DeleteRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.user_id, None);
        assert!(req.delete_entries.is_empty());

        let req: UpdateRequest = serde_json::from_str(
            r#"{"user_id":1,"private_data_updates":[{"client_side_id":"c1","payload":"p","hash":"h"}]}"#,
        )
        .unwrap();
        assert_eq!(req.private_data_updates[0].version, None);
    }
}
