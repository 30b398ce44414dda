//! Remote document store bridge
//!
//! The remote holds the one shared app document every device syncs against.
//! Reads and writes are async and bounded by a timeout; a live subscription
//! pushes every change (including this client's own writes) to a callback.
//!
//! ```text
//! Connecting ──first snapshot──▶ Live ◀──────▶ Reconnecting
//!                                 │  transient loss / recovery
//!                                 ├──terminal error──▶ Error
//!                                 └──unsubscribe────▶ Closed
//! ```

pub mod sqlite;

pub use sqlite::{SqliteRemote, SqliteRemoteConfig};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::model::AppState;

/// A remote document as read at a given revision.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    pub state: AppState,
    /// Bumped by one on every persist, by any writer.
    pub revision: u64,
}

/// Called with each new remote snapshot; `None` means the document does not exist yet.
pub type ChangeHandler = Arc<dyn Fn(Option<RemoteSnapshot>) + Send + Sync>;

/// Called once when a subscription fails terminally.
pub type ErrorHandler = Arc<dyn Fn(StoreError) + Send + Sync>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot read of the shared document.
    async fn fetch(&self) -> Result<Option<RemoteSnapshot>, StoreError>;

    /// Merge-write the state: top-level fields in `state` replace the remote
    /// ones, remote fields `state` does not carry are left alone. Returns the
    /// new revision.
    async fn persist(&self, state: &AppState) -> Result<u64, StoreError>;

    /// Open a live channel. Must be called from within a tokio runtime.
    fn subscribe(&self, on_change: ChangeHandler, on_error: ErrorHandler) -> Subscription;
}

/// Read side a polling subscription runs against.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn snapshot(&self) -> Result<Option<RemoteSnapshot>, StoreError>;

    /// Resolves when this process wrote to the source. Pending forever if the
    /// source cannot tell.
    async fn changed(&self) {
        std::future::pending::<()>().await
    }
}

/// Timing for [`poll_subscription`].
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Live,
    Reconnecting,
    Closed,
    Error,
}

impl SubscriptionState {
    fn is_final(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Handle to a live subscription.
///
/// [`unsubscribe`](Self::unsubscribe) may be called any number of times; only
/// the first call does anything. Dropping the handle unsubscribes too.
pub struct Subscription {
    active: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    state_tx: Arc<watch::Sender<SubscriptionState>>,
    state_rx: watch::Receiver<SubscriptionState>,
}

/// Driver side of a subscription, owned by the task that feeds it.
pub struct SubscriptionLink {
    active: Arc<AtomicBool>,
    shutdown_rx: broadcast::Receiver<()>,
    state_tx: Arc<watch::Sender<SubscriptionState>>,
    on_change: ChangeHandler,
    on_error: ErrorHandler,
}

impl Subscription {
    /// Create a handle and the link a driver task uses to feed it.
    pub fn channel(on_change: ChangeHandler, on_error: ErrorHandler) -> (Self, SubscriptionLink) {
        let active = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Connecting);
        let state_tx = Arc::new(state_tx);

        let link = SubscriptionLink {
            active: active.clone(),
            shutdown_rx,
            state_tx: state_tx.clone(),
            on_change,
            on_error,
        };

        let subscription = Self {
            active,
            shutdown_tx,
            state_tx,
            state_rx,
        };

        (subscription, link)
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state_rx.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until the subscription reaches a state matching `pred`, or `limit` elapses.
    pub async fn wait_for(
        &self,
        limit: Duration,
        mut pred: impl FnMut(SubscriptionState) -> bool,
    ) -> Option<SubscriptionState> {
        let mut rx = self.state_rx.clone();
        let wait = async {
            loop {
                let current = *rx.borrow_and_update();
                if pred(current) {
                    return Some(current);
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(limit, wait).await.ok().flatten()
    }

    /// Release the channel. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        self.state_tx.send_if_modified(|state| {
            if *state == SubscriptionState::Error {
                false
            } else {
                *state = SubscriptionState::Closed;
                true
            }
        });
        debug!("Subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl SubscriptionLink {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Move to `next` unless the subscription already ended.
    pub fn set_state(&self, next: SubscriptionState) {
        self.state_tx.send_if_modified(|state| {
            if state.is_final() || *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Hand a snapshot to the subscriber. Dropped if the subscriber already left.
    pub fn deliver(&self, snapshot: Option<RemoteSnapshot>) {
        if self.is_active() {
            (self.on_change)(snapshot);
        }
    }

    /// End the subscription with a terminal error.
    pub fn fail(&self, error: StoreError) {
        self.set_state(SubscriptionState::Error);
        if self.active.swap(false, Ordering::SeqCst) {
            (self.on_error)(error);
        }
    }

    /// Resolves once the subscriber unsubscribes or drops its handle.
    pub async fn closed(&mut self) {
        let _ = self.shutdown_rx.recv().await;
    }
}

/// Drive `link` from `source` until the subscriber leaves or a fatal error.
///
/// Each poll tick (or local change) reads a snapshot and delivers it when its
/// revision differs from the last one delivered. Transient errors move the
/// subscription to `Reconnecting` and retry after `reconnect_delay`; nothing
/// is delivered for them. Any other error ends it through `link.fail`.
pub async fn poll_subscription<S>(source: Arc<S>, config: PollConfig, mut link: SubscriptionLink)
where
    S: SnapshotSource + ?Sized,
{
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Revision last handed to the subscriber; `Some(None)` means "absent" was delivered.
    let mut delivered: Option<Option<u64>> = None;
    let mut reconnect_attempts = 0u32;

    loop {
        tokio::select! {
            _ = link.closed() => break,
            _ = ticker.tick() => {}
            _ = source.changed() => {}
        }
        if !link.is_active() {
            break;
        }

        match with_timeout("subscribe", config.timeout, source.snapshot()).await {
            Ok(snapshot) => {
                if reconnect_attempts > 0 {
                    info!(attempts = reconnect_attempts, "Subscription recovered");
                    reconnect_attempts = 0;
                }
                link.set_state(SubscriptionState::Live);

                let revision = snapshot.as_ref().map(|s| s.revision);
                if delivered != Some(revision) {
                    debug!(?revision, "Delivering remote snapshot");
                    delivered = Some(revision);
                    link.deliver(snapshot);
                }
            }
            Err(e) if e.is_transient() => {
                reconnect_attempts += 1;
                warn!(error = %e, attempt = reconnect_attempts, "Remote unavailable, reconnecting");
                link.set_state(SubscriptionState::Reconnecting);
                tokio::select! {
                    _ = link.closed() => break,
                    _ = tokio::time::sleep(config.reconnect_delay) => {}
                }
            }
            Err(e) => {
                error!(error = %e, "Subscription failed");
                link.fail(e);
                break;
            }
        }
    }

    debug!("Subscription task stopped");
}

/// Field-level upsert of `incoming` over `existing`.
pub fn merge_top_level(existing: Option<Map<String, Value>>, incoming: Map<String, Value>) -> Map<String, Value> {
    let mut merged = existing.unwrap_or_default();
    for (key, value) in incoming {
        merged.insert(key, value);
    }
    merged
}

pub(crate) async fn with_timeout<T, F>(op: &'static str, limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            op,
            after_ms: limit.as_millis() as u64,
        }),
    }
}
