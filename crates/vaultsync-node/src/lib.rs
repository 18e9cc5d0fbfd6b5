//! # Vaultsync Node
//!
//! HTTP server for end-to-end encrypted vault storage and synchronization.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Vaultsync Node                       │
//! ├──────────────────────────────────────────────────────────┤
//! │  Transport: gzip, body limit, timeout, request id,       │
//! │             access log, panic recovery                   │
//! │  Auth middleware: bearer token -> Identity               │
//! │  Extractors: JSON body, envelope MAC check               │
//! │                           │                              │
//! │  Handlers: /data, /sync, /user, /health, /metrics        │
//! │                           │                              │
//! │  vaultsync-core: guard, mutation engine, sync engine     │
//! │                           │                              │
//! │  vaultsync-storage: memory or SQLite                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Application state, error mapping, and the router
//! - [`auth`] - Bearer token middleware
//! - [`extract`] - Request body extractors
//! - [`data_api`] - Record upload, download, update, delete
//! - [`sync_api`] - Record state descriptors
//! - [`user_api`] - Registration, login, encryption salt
//! - [`health`] - Liveness and readiness checks
//! - [`config`] - Node configuration
//! - [`observability`] - Logging, metrics, request ids
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vaultsync_node::api::{create_router, AppState};
//! use vaultsync_node::config::NodeConfig;
//! use vaultsync_storage::MemoryStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = NodeConfig::load(None)?.validated()?;
//! let store = Arc::new(MemoryStore::new());
//! let state = AppState::new(&config, store.clone(), store)?;
//! let app = create_router(state);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod data_api;
pub mod extract;
pub mod health;
pub mod observability;
pub mod sync_api;
pub mod user_api;
