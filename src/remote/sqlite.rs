//! SQLite-backed shared document store
//!
//! One row per `(collection, doc_id)` holding the JSON document and a revision
//! counter. Every device opens the same database file. Change notification is
//! polling on the revision, plus an in-process wakeup so subscribers on the
//! writing instance see their own writes without waiting for the next tick.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde_json::{Map, Value};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::{
    merge_top_level, poll_subscription, with_timeout, ChangeHandler, ErrorHandler, PollConfig,
    RemoteSnapshot, RemoteStore, SnapshotSource, Subscription,
};
use crate::config::RemoteConfig;
use crate::error::StoreError;
use crate::model::AppState;
use crate::schema;

/// Configuration for the SQLite remote
#[derive(Debug, Clone)]
pub struct SqliteRemoteConfig {
    pub db_path: PathBuf,
    pub collection: String,
    pub doc_id: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
}

impl Default for SqliteRemoteConfig {
    fn default() -> Self {
        SqliteRemoteConfig::from(&RemoteConfig::default())
    }
}

impl From<&RemoteConfig> for SqliteRemoteConfig {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            db_path: config.db_path.clone(),
            collection: config.collection.clone(),
            doc_id: config.doc_id.clone(),
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

struct Inner {
    conn: Mutex<Connection>,
    config: SqliteRemoteConfig,
    changed: Notify,
}

/// Shared document store on a SQLite file
#[derive(Clone)]
pub struct SqliteRemote {
    inner: Arc<Inner>,
}

impl SqliteRemote {
    /// Open or create the document database.
    pub fn open(config: SqliteRemoteConfig) -> Result<Self, StoreError> {
        if config.poll_interval.is_zero() {
            return Err(StoreError::Config("poll interval must be > 0".into()));
        }
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.db_path)?;

        // WAL lets other devices read while one writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                data TEXT NOT NULL,
                revision INTEGER NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (collection, doc_id)
            );",
        )?;

        info!(
            path = %config.db_path.display(),
            collection = %config.collection,
            doc_id = %config.doc_id,
            "Remote document store opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                config,
                changed: Notify::new(),
            }),
        })
    }

    /// Open with default settings at a specific path
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(SqliteRemoteConfig {
            db_path: path.into(),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &SqliteRemoteConfig {
        &self.inner.config
    }

    pub fn poll_config(&self) -> PollConfig {
        let config = &self.inner.config;
        PollConfig {
            poll_interval: config.poll_interval,
            reconnect_delay: config.reconnect_delay,
            timeout: config.timeout,
        }
    }
}

impl Inner {
    async fn blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection, &SqliteRemoteConfig) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = inner
                .conn
                .lock()
                .map_err(|_| StoreError::Task("remote connection lock poisoned".into()))?;
            f(&mut conn, &inner.config)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn fetch(self: &Arc<Self>) -> Result<Option<RemoteSnapshot>, StoreError> {
        self.blocking(|conn, config| fetch_row(conn, config)).await
    }
}

fn fetch_row(conn: &Connection, config: &SqliteRemoteConfig) -> Result<Option<RemoteSnapshot>, StoreError> {
    let row = conn
        .query_row(
            "SELECT data, revision FROM documents WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![config.collection, config.doc_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    match row {
        Some((data, revision)) => Ok(Some(RemoteSnapshot {
            state: schema::decode(data.as_bytes())?,
            revision: revision as u64,
        })),
        None => Ok(None),
    }
}

fn upsert_row(
    conn: &mut Connection,
    config: &SqliteRemoteConfig,
    incoming: Map<String, Value>,
) -> Result<u64, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = tx
        .query_row(
            "SELECT data, revision FROM documents WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![config.collection, config.doc_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    let (base, revision) = match existing {
        Some((data, revision)) => {
            let base = match serde_json::from_str::<Value>(&data) {
                Ok(Value::Object(map)) => Some(map),
                Ok(_) | Err(_) => {
                    warn!(doc_id = %config.doc_id, "Stored document is not an object, overwriting");
                    None
                }
            };
            (base, revision as u64 + 1)
        }
        None => (None, 1),
    };

    let merged = merge_top_level(base, incoming);
    let data = serde_json::to_string(&Value::Object(merged))?;

    tx.execute(
        "INSERT INTO documents (collection, doc_id, data, revision, updated_at)
         VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))
         ON CONFLICT(collection, doc_id) DO UPDATE SET
            data = excluded.data,
            revision = excluded.revision,
            updated_at = excluded.updated_at",
        rusqlite::params![config.collection, config.doc_id, data, revision as i64],
    )?;
    tx.commit()?;

    debug!(doc_id = %config.doc_id, revision, bytes = data.len(), "Document persisted");
    Ok(revision)
}

#[async_trait]
impl RemoteStore for SqliteRemote {
    async fn fetch(&self) -> Result<Option<RemoteSnapshot>, StoreError> {
        with_timeout("fetch", self.inner.config.timeout, self.inner.fetch()).await
    }

    async fn persist(&self, state: &AppState) -> Result<u64, StoreError> {
        let incoming = schema::encode_value(state)?;
        let write = self
            .inner
            .blocking(move |conn, config| upsert_row(conn, config, incoming));
        let revision = with_timeout("persist", self.inner.config.timeout, write).await?;
        self.inner.changed.notify_waiters();
        Ok(revision)
    }

    fn subscribe(&self, on_change: ChangeHandler, on_error: ErrorHandler) -> Subscription {
        let (subscription, link) = Subscription::channel(on_change, on_error);
        info!(doc_id = %self.inner.config.doc_id, "Subscription connecting");
        tokio::spawn(poll_subscription(Arc::new(self.clone()), self.poll_config(), link));
        subscription
    }
}

#[async_trait]
impl SnapshotSource for SqliteRemote {
    async fn snapshot(&self) -> Result<Option<RemoteSnapshot>, StoreError> {
        self.inner.fetch().await
    }

    /// Wakes on persists made through any handle cloned from this one.
    async fn changed(&self) {
        self.inner.changed.notified().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Theme, User, UserRole};
    use crate::remote::SubscriptionState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteRemote {
        SqliteRemote::open(SqliteRemoteConfig {
            db_path: dir.path().join("remote.db"),
            poll_interval: Duration::from_millis(20),
            reconnect_delay: Duration::from_millis(20),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_absent_document() {
        let dir = TempDir::new().unwrap();
        let remote = open(&dir);
        assert!(remote.fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_then_fetch_bumps_revision() {
        let dir = TempDir::new().unwrap();
        let remote = open(&dir);

        let mut state = AppState::default();
        assert_eq!(remote.persist(&state).await.unwrap(), 1);

        state.theme = Theme::Light;
        assert_eq!(remote.persist(&state).await.unwrap(), 2);

        let snapshot = remote.fetch().await.unwrap().unwrap();
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.state, state);
    }

    #[tokio::test]
    async fn persist_keeps_remote_only_fields() {
        let dir = TempDir::new().unwrap();
        let remote = open(&dir);

        {
            let conn = remote.inner.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO documents (collection, doc_id, data, revision) VALUES (?1, ?2, ?3, 7)",
                rusqlite::params![
                    "prop_lifecycle",
                    "app_state",
                    r#"{"users":[],"auditLog":["seeded"]}"#
                ],
            )
            .unwrap();
        }

        let mut state = AppState::default();
        state
            .users
            .push(User::new("u1", "Ada", "a@x.io", UserRole::Agent));
        assert_eq!(remote.persist(&state).await.unwrap(), 8);

        let snapshot = remote.fetch().await.unwrap().unwrap();
        assert_eq!(snapshot.state.users.len(), 1);
        assert_eq!(snapshot.state.extra["auditLog"][0], "seeded");
    }

    #[tokio::test]
    async fn subscription_delivers_initial_and_own_writes() {
        let dir = TempDir::new().unwrap();
        let remote = open(&dir);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let on_change: ChangeHandler = {
            let seen = seen.clone();
            Arc::new(move |snapshot: Option<RemoteSnapshot>| {
                seen.lock().unwrap().push(snapshot.map(|s| s.revision));
            })
        };
        let on_error: ErrorHandler = Arc::new(|_| {});

        let subscription = remote.subscribe(on_change, on_error);
        let state = subscription
            .wait_for(Duration::from_secs(2), |s| s == SubscriptionState::Live)
            .await;
        assert_eq!(state, Some(SubscriptionState::Live));

        remote.persist(&AppState::default()).await.unwrap();
        for _ in 0..100 {
            if seen.lock().unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(*seen.lock().unwrap(), vec![None, Some(1)]);
        subscription.unsubscribe();
        assert_eq!(subscription.state(), SubscriptionState::Closed);
    }

    #[tokio::test]
    async fn no_delivery_after_unsubscribe() {
        let dir = TempDir::new().unwrap();
        let remote = open(&dir);

        let count = Arc::new(AtomicUsize::new(0));
        let on_change: ChangeHandler = {
            let count = count.clone();
            Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let subscription = remote.subscribe(on_change, Arc::new(|_| {}));
        subscription
            .wait_for(Duration::from_secs(2), |s| s == SubscriptionState::Live)
            .await;
        subscription.unsubscribe();
        subscription.unsubscribe();

        let before = count.load(Ordering::SeqCst);
        remote.persist(&AppState::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }
}
