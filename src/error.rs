//! Error types for prop-lifecycle-store

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache error: {0}")]
    Cache(#[from] sled::Error),

    #[error("Remote store error: {0}")]
    Remote(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("{op} timed out after {after_ms}ms")]
    Timeout { op: &'static str, after_ms: u64 },

    #[error("Could not find a free {prefix} display id after {attempts} attempts")]
    IdSpaceExhausted { prefix: &'static str, attempts: u32 },

    #[error("No user with id {0}")]
    UnknownUser(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether a retry of the same remote operation may succeed.
    ///
    /// The subscription loop uses this to pick `Reconnecting` over a terminal `Error`.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Remote(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
