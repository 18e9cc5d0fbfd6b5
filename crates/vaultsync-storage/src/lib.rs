//! Record and credential storage for vaultsync.
//!
//! This crate provides the transactional persistence the synchronization
//! engine builds on:
//!
//! - [`VaultStore`] / [`VaultTransaction`]: per-user transactions over vault
//!   records with a unique `(user_id, client_side_id)` constraint, plus
//!   read-committed listings and sync descriptor queries.
//! - [`CredentialStore`]: registered users and their verifier material.
//!
//! Two backends are available: [`MemoryStore`] (feature `memory`) and
//! [`SqliteStore`] (feature `sqlite`).

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use error::{Result, StorageError};
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use traits::{CredentialStore, StorageStats, VaultStore, VaultTransaction};
