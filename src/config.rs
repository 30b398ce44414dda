//! Configuration for prop-lifecycle-store

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StoreError;

/// Default data directory for the cache and the shared document database
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prop-lifecycle")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub ids: IdConfig,
}

/// Local cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// sled directory holding the device snapshot
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Key the snapshot is stored under
    #[serde(default = "default_cache_key")]
    pub key: String,
}

/// Shared document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// SQLite file shared by every device
    #[serde(default = "default_remote_db")]
    pub db_path: PathBuf,

    /// Collection holding the app document
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Document id within the collection
    #[serde(default = "default_doc_id")]
    pub doc_id: String,

    /// Timeout for a single fetch or persist, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How often a live subscription checks for changes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before retrying after a transient failure
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

/// Display id generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    /// Rejection-sampling cap before giving up on a fresh id
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

// Defaults
fn default_cache_path() -> PathBuf { default_data_dir().join("cache.sled") }
fn default_cache_key() -> String { crate::cache::DEFAULT_CACHE_KEY.to_string() }
fn default_remote_db() -> PathBuf { default_data_dir().join("remote.db") }
fn default_collection() -> String { "prop_lifecycle".to_string() }
fn default_doc_id() -> String { "app_state".to_string() }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_reconnect_delay_ms() -> u64 { 2000 }
fn default_max_attempts() -> u32 { crate::ids::DEFAULT_MAX_ATTEMPTS }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            key: default_cache_key(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            db_path: default_remote_db(),
            collection: default_collection(),
            doc_id: default_doc_id(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.cache.key.is_empty() {
            return Err(StoreError::Config("cache.key must not be empty".into()));
        }
        if self.remote.collection.is_empty() || self.remote.doc_id.is_empty() {
            return Err(StoreError::Config(
                "remote.collection and remote.doc_id must not be empty".into(),
            ));
        }
        if self.remote.poll_interval_ms == 0 {
            return Err(StoreError::Config("remote.poll_interval_ms must be > 0".into()));
        }
        if self.ids.max_attempts == 0 {
            return Err(StoreError::Config("ids.max_attempts must be > 0".into()));
        }
        Ok(())
    }
}
