//! Node configuration.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. An optional configuration file (TOML, YAML, or JSON by extension)
//! 3. Environment variables prefixed with `VAULTSYNC__`, with `__` between
//!    nesting levels (`VAULTSYNC__AUTH__SIGNING_KEY`)
//! 4. Command-line flags, applied by the binary

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is out of range or missing.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Configuration for a vaultsync node.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP server.
    #[validate(nested)]
    pub server: ServerConfig,
    /// Bearer tokens.
    #[validate(nested)]
    pub auth: AuthConfig,
    /// Transport integrity MAC.
    #[validate(nested)]
    pub integrity: IntegrityConfig,
    /// Persistence.
    #[validate(nested)]
    pub storage: StorageConfig,
    /// Request size limits.
    #[validate(nested)]
    pub limits: LimitsConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Per-request timeout.
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    /// Largest accepted request body, after decompression.
    #[validate(range(min = 1024))]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            request_timeout_secs: 30,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Bearer token settings.
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing key.
    #[validate(length(min = 16, message = "signing key must have at least 16 bytes"))]
    pub signing_key: String,
    /// Expected `iss` claim.
    #[validate(length(min = 1))]
    pub issuer: String,
    /// Token lifetime.
    #[validate(range(min = 1))]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: String::new(),
            issuer: "vaultsync".to_string(),
            token_ttl_secs: 3600,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_key", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Transport integrity settings.
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Key shared with clients for the envelope MAC.
    #[validate(length(min = 1, message = "integrity key must not be empty"))]
    pub key: String,
    /// Number of pooled hashers.
    #[validate(range(min = 1))]
    pub pool_size: usize,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            pool_size: 32,
        }
    }
}

impl std::fmt::Debug for IntegrityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityConfig")
            .field("key", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-process store.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// Persistence settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_storage"))]
pub struct StorageConfig {
    /// Which backend to use.
    pub backend: StorageBackend,
    /// Database file; required for `sqlite`.
    pub path: Option<PathBuf>,
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ValidationError> {
    if storage.backend == StorageBackend::Sqlite && storage.path.is_none() {
        let mut err = ValidationError::new("sqlite_path");
        err.message = Some("storage.path is required for the sqlite backend".into());
        return Err(err);
    }
    Ok(())
}

/// Limits on request contents.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest batch or id list accepted.
    #[validate(range(min = 1))]
    pub max_batch_items: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_items: vaultsync_core::DEFAULT_MAX_BATCH_ITEMS,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of pretty output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl NodeConfig {
    /// Loads defaults, then `path` if given, then the environment.
    ///
    /// The result is not validated; call [`NodeConfig::validated`] once
    /// command-line overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("VAULTSYNC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Returns the config if every value is acceptable.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }
}
