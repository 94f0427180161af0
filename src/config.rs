//! Configuration
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. `SNIPBIN_*` environment variables, `__` separating sections
//!    (e.g. `SNIPBIN_STORE__IDENT_SIZE=8`, `SNIPBIN_SERVER__PORT=9000`)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SNIPBIN";

/// Snippet store configuration
///
/// # Example
///
/// ```rust
/// use snipbin::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_ident_size(8)
///     .with_cleanup_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Length of generated identifiers
    pub ident_size: usize,
    /// Candidates tried before creation fails with `AllocationExhausted`
    pub max_allocation_attempts: usize,
    /// Seconds between sweeps of expired keys in the in-memory backend
    pub cleanup_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ident_size: 6,
            max_allocation_attempts: 20,
            cleanup_interval_secs: 60,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ident_size(mut self, size: usize) -> Self {
        self.ident_size = size;
        self
    }

    pub fn with_max_allocation_attempts(mut self, attempts: usize) -> Self {
        self.max_allocation_attempts = attempts;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_secs = interval.as_secs().max(1);
        self
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,
    pub port: u16,
    /// Largest accepted snippet body in bytes
    pub max_code_bytes: usize,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            max_code_bytes: 1024 * 1024, // 1MB
            enable_cors: true,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub(crate) fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Config = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the store cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.store.ident_size == 0 {
            return Err(Error::Config("store.ident_size must be at least 1".to_string()));
        }
        if self.store.max_allocation_attempts == 0 {
            return Err(Error::Config(
                "store.max_allocation_attempts must be at least 1".to_string(),
            ));
        }
        if self.store.cleanup_interval_secs == 0 {
            return Err(Error::Config(
                "store.cleanup_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
