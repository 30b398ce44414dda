//! Local cache - per-device snapshot of the app state
//!
//! Reads and writes are synchronous. The cache is the fast path for every
//! render, so it never touches the network.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::AppState;
use crate::schema;

/// Key the serialized state is stored under.
pub const DEFAULT_CACHE_KEY: &str = "prop_lifecycle_data";

/// Synchronous snapshot storage for the full app state.
pub trait LocalCache: Send + Sync {
    /// Last written snapshot, or the default state when none exists or the
    /// snapshot cannot be decoded.
    fn read(&self) -> AppState;

    /// Replace the snapshot. No merge, no versioning.
    fn write(&self, state: &AppState) -> Result<(), StoreError>;

    /// Whether any snapshot has been written on this device.
    fn has_snapshot(&self) -> bool;
}

/// Configuration for the sled-backed cache
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// Path to the sled database directory
    pub path: PathBuf,
    /// Key the snapshot lives under
    pub key: String,
    /// Open a throwaway database that is removed on drop
    pub temporary: bool,
}

impl Default for SledCacheConfig {
    fn default() -> Self {
        Self {
            path: crate::config::default_data_dir().join("cache.sled"),
            key: DEFAULT_CACHE_KEY.to_string(),
            temporary: false,
        }
    }
}

/// Local cache backed by a sled tree
pub struct SledCache {
    db: sled::Db,
    key: String,
}

impl SledCache {
    pub fn open(config: SledCacheConfig) -> Result<Self, StoreError> {
        if !config.temporary {
            if let Some(parent) = config.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;

        info!(path = %config.path.display(), key = %config.key, "Local cache opened");

        Ok(Self {
            db,
            key: config.key,
        })
    }

    /// Open the cache at a specific path with the default key
    pub fn at_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(SledCacheConfig {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    /// In-memory cache for tests and one-off tools
    pub fn temporary() -> Result<Self, StoreError> {
        Self::open(SledCacheConfig {
            path: std::env::temp_dir().join(format!("prop-lifecycle-{}", uuid::Uuid::new_v4())),
            temporary: true,
            ..Default::default()
        })
    }

    fn read_snapshot(&self) -> Result<Option<AppState>, StoreError> {
        match self.db.get(self.key.as_bytes())? {
            Some(bytes) => Ok(Some(schema::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl LocalCache for SledCache {
    fn read(&self) -> AppState {
        match self.read_snapshot() {
            Ok(Some(state)) => state,
            Ok(None) => AppState::default(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Cached snapshot unreadable, using default state");
                AppState::default()
            }
        }
    }

    fn write(&self, state: &AppState) -> Result<(), StoreError> {
        let bytes = schema::encode(state)?;
        let len = bytes.len();
        self.db.insert(self.key.as_bytes(), bytes)?;
        self.db.flush()?;
        debug!(key = %self.key, bytes = len, "Cache snapshot written");
        Ok(())
    }

    fn has_snapshot(&self) -> bool {
        self.db.contains_key(self.key.as_bytes()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Theme, User, UserRole};
    use tempfile::TempDir;

    #[test]
    fn empty_cache_reads_default() {
        let cache = SledCache::temporary().unwrap();
        assert!(!cache.has_snapshot());
        assert_eq!(cache.read(), AppState::default());
    }

    #[test]
    fn write_then_read_round_trips() {
        let cache = SledCache::temporary().unwrap();
        let mut state = AppState::default();
        state.theme = Theme::Light;
        state
            .users
            .push(User::new("u1", "Ada", "a@x.io", UserRole::Tenant));

        cache.write(&state).unwrap();
        assert!(cache.has_snapshot());
        assert_eq!(cache.read(), state);
    }

    #[test]
    fn write_overwrites_previous_snapshot() {
        let cache = SledCache::temporary().unwrap();
        let mut first = AppState::default();
        first
            .users
            .push(User::new("u1", "Ada", "a@x.io", UserRole::Tenant));
        cache.write(&first).unwrap();

        let second = AppState::default();
        cache.write(&second).unwrap();
        assert!(cache.read().users.is_empty());
    }

    #[test]
    fn corrupt_snapshot_falls_back_to_default() {
        let cache = SledCache::temporary().unwrap();
        cache
            .db
            .insert(cache.key.as_bytes(), &b"{not json"[..])
            .unwrap();
        assert_eq!(cache.read(), AppState::default());
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.sled");

        let mut state = AppState::default();
        state.theme = Theme::Light;
        {
            let cache = SledCache::at_path(&path).unwrap();
            cache.write(&state).unwrap();
        }

        let cache = SledCache::at_path(&path).unwrap();
        assert_eq!(cache.read().theme, Theme::Light);
    }
}
