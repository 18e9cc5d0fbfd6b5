//! Common types used throughout `vaultsync`.
//!
//! This crate provides the value types shared by the storage layer, the
//! synchronization engine and the HTTP node: identifiers, timestamps,
//! vault records and the record state descriptors exchanged during sync.

mod id;
mod record;
mod timestamp;
mod user;

pub use id::{ParseIdError, ServerId, UserId};
pub use record::{NewRecord, Record, RecordDeletion, RecordState, RecordUpdate};
pub use timestamp::Timestamp;
pub use user::User;

/// Returns true if a client-side identifier is empty or whitespace only.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
