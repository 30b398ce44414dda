//! State synchronizer - the one read/write/subscribe surface for the app
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Synchronizer                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  read()       LocalCache only, never waits on the network     │
//! │  write()      LocalCache now, RemoteStore via persist queue   │
//! │  init_sync()  RemoteStore push ──▶ LocalCache ──▶ on_update    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Consistency is last-writer-wins per top-level field of the shared
//! document. Writes from this device reach the remote in the order they were
//! made. Every state handed out by `read()` or `pull()` carries the remote
//! revision it was read at; a commit that passes over another writer's
//! revision since then is flagged as `stale_base` so the caller can re-read
//! and re-apply.

pub mod write;

pub use write::{LocalStatus, RemoteStatus, WriteTicket};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::cache::LocalCache;
use crate::error::StoreError;
use crate::ids::DEFAULT_MAX_ATTEMPTS;
use crate::model::AppState;
use crate::remote::{ChangeHandler, ErrorHandler, RemoteSnapshot, RemoteStore, Subscription};
use crate::repair::{self, RepairReport};

/// Own commits remembered for stale-base checks.
const OWN_REVISIONS_KEPT: usize = 1024;

struct PersistJob {
    state: AppState,
    /// Revision the state was read at.
    base: u64,
    status: watch::Sender<RemoteStatus>,
}

struct Shared {
    cache: Arc<dyn LocalCache>,
    remote: Arc<dyn RemoteStore>,
    /// Highest remote revision this device has observed.
    known_revision: Arc<AtomicU64>,
    /// Revision of the remote snapshot last written into the cache.
    cache_revision: AtomicU64,
    /// Persist queue, started on first write.
    jobs: OnceLock<mpsc::UnboundedSender<PersistJob>>,
}

/// Composes the local cache and the remote store.
///
/// Construct one per process and pass it to whatever needs the app state.
pub struct Synchronizer {
    shared: Arc<Shared>,
    max_id_attempts: u32,
    session_repaired: AtomicBool,
}

impl Synchronizer {
    pub fn new(cache: Arc<dyn LocalCache>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                cache,
                remote,
                known_revision: Arc::new(AtomicU64::new(0)),
                cache_revision: AtomicU64::new(0),
                jobs: OnceLock::new(),
            }),
            max_id_attempts: DEFAULT_MAX_ATTEMPTS,
            session_repaired: AtomicBool::new(false),
        }
    }

    pub fn with_max_id_attempts(mut self, max_id_attempts: u32) -> Self {
        self.max_id_attempts = max_id_attempts;
        self
    }

    pub fn max_id_attempts(&self) -> u32 {
        self.max_id_attempts
    }

    pub fn known_revision(&self) -> u64 {
        self.shared.known_revision.load(Ordering::SeqCst)
    }

    /// Current state from the local cache, stamped with its `base_revision`.
    pub fn read(&self) -> AppState {
        self.shared.read()
    }

    /// Apply `state` to the cache, then queue it for the remote.
    ///
    /// The next `read()` observes `state` as soon as this returns. The remote
    /// outcome is on the ticket; a failure there does not roll the cache back.
    /// The commit is checked for staleness against `state.base_revision`.
    ///
    /// Fails with [`StoreError::Task`] outside a tokio runtime, before the
    /// cache is touched.
    pub fn write(&self, state: AppState) -> Result<WriteTicket, StoreError> {
        let runtime = current_runtime()?;
        self.shared.cache.write(&state)?;
        Ok(self.shared.enqueue(&runtime, state))
    }

    /// Write and wait for the remote phase.
    pub async fn save(&self, state: AppState) -> Result<RemoteStatus, StoreError> {
        let ticket = self.write(state)?;
        Ok(ticket.remote_settled().await)
    }

    /// Read, modify and write back in one step.
    pub fn update<F>(&self, f: F) -> Result<WriteTicket, StoreError>
    where
        F: FnOnce(&mut AppState) -> Result<(), StoreError>,
    {
        let mut state = self.read();
        f(&mut state)?;
        self.write(state)
    }

    /// Fetch the remote once and overwrite the cache if a document exists.
    pub async fn pull(&self) -> Result<Option<AppState>, StoreError> {
        match self.shared.remote.fetch().await? {
            Some(snapshot) => {
                let state = self.shared.store_snapshot(snapshot)?;
                info!(revision = state.base_revision, "Pulled remote state into cache");
                Ok(Some(state))
            }
            None => {
                debug!("No remote document to pull");
                Ok(None)
            }
        }
    }

    /// Persist the cached state as-is.
    pub async fn push(&self) -> Result<RemoteStatus, StoreError> {
        let runtime = current_runtime()?;
        let ticket = self.shared.enqueue(&runtime, self.read());
        Ok(ticket.remote_settled().await)
    }

    /// Follow the remote document.
    ///
    /// Each remote change overwrites the cache and is passed to `on_update`.
    /// Connection errors go to `on_error` and leave the cache untouched. When
    /// the remote document does not exist yet it is seeded from the cache.
    /// Must be called within a tokio runtime.
    pub fn init_sync<U, E>(&self, on_update: U, on_error: E) -> Subscription
    where
        U: Fn(AppState) + Send + Sync + 'static,
        E: Fn(StoreError) + Send + Sync + 'static,
    {
        let shared = self.shared.clone();
        let on_change: ChangeHandler = Arc::new(move |snapshot: Option<RemoteSnapshot>| match snapshot {
            Some(snapshot) => match shared.store_snapshot(snapshot) {
                Ok(state) => on_update(state),
                Err(e) => warn!(error = %e, "Could not cache remote update"),
            },
            None => match current_runtime() {
                Ok(runtime) => {
                    info!("Remote document missing, seeding it from the local cache");
                    shared.enqueue(&runtime, shared.read());
                }
                Err(e) => warn!(error = %e, "Could not seed the remote document"),
            },
        });

        let on_error: ErrorHandler = Arc::new(move |e: StoreError| {
            error!(error = %e, "Remote sync connection error");
            on_error(e);
        });

        self.shared.remote.subscribe(on_change, on_error)
    }

    /// Run the repair pass over the cached state and write it back if anything changed.
    pub fn repair(&self) -> Result<(RepairReport, Option<WriteTicket>), StoreError> {
        let mut state = self.read();
        let report = repair::repair_in_place(&mut state, self.max_id_attempts)?;
        if !report.was_modified() {
            debug!("Repair pass found nothing to fix");
            return Ok((report, None));
        }

        info!(changes = report.changes.len(), "Repair pass fixed display ids");
        let ticket = self.write(state)?;
        Ok((report, Some(ticket)))
    }

    /// Claim this session's repair run. True only the first time.
    pub(crate) fn claim_session_repair(&self) -> bool {
        !self.session_repaired.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn release_session_repair(&self) {
        self.session_repaired.store(false, Ordering::SeqCst);
    }
}

fn current_runtime() -> Result<Handle, StoreError> {
    Handle::try_current().map_err(|e| StoreError::Task(format!("no tokio runtime: {e}")))
}

impl Shared {
    fn read(&self) -> AppState {
        // Revision first: a snapshot landing in between only makes the base older.
        let base = self.cache_revision.load(Ordering::SeqCst);
        let mut state = self.cache.read();
        state.base_revision = base;
        state
    }

    /// Write a remote snapshot into the cache and return it stamped with its revision.
    fn store_snapshot(&self, snapshot: RemoteSnapshot) -> Result<AppState, StoreError> {
        self.known_revision.fetch_max(snapshot.revision, Ordering::SeqCst);
        let mut state = snapshot.state;
        self.cache.write(&state)?;
        self.cache_revision.store(snapshot.revision, Ordering::SeqCst);
        state.base_revision = snapshot.revision;
        Ok(state)
    }

    fn enqueue(&self, runtime: &Handle, state: AppState) -> WriteTicket {
        let (status, rx) = watch::channel(RemoteStatus::Pending);
        // The queue task holds no reference back to `Shared`, so dropping the
        // synchronizer closes the channel and ends the task.
        let jobs = self.jobs.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            runtime.spawn(run_persist_queue(
                self.remote.clone(),
                self.known_revision.clone(),
                rx,
            ));
            tx
        });

        let base = state.base_revision;
        if let Err(mpsc::error::SendError(job)) = jobs.send(PersistJob { state, base, status }) {
            job.status
                .send_replace(RemoteStatus::Failed("persist queue closed".into()));
        }
        WriteTicket::new(rx)
    }
}

async fn run_persist_queue(
    remote: Arc<dyn RemoteStore>,
    known_revision: Arc<AtomicU64>,
    mut jobs: mpsc::UnboundedReceiver<PersistJob>,
) {
    let mut own = BTreeSet::new();
    while let Some(job) = jobs.recv().await {
        let base = job.base;
        let status = match remote.persist(&job.state).await {
            Ok(revision) => {
                // Anything between the base and this commit that was not our own write.
                let stale_base = (base.saturating_add(1)..revision).any(|r| !own.contains(&r));
                if stale_base {
                    warn!(
                        base,
                        revision,
                        "Write landed over remote changes this device had not seen"
                    );
                }
                own.insert(revision);
                if own.len() > OWN_REVISIONS_KEPT {
                    own.pop_first();
                }
                known_revision.fetch_max(revision, Ordering::SeqCst);
                debug!(revision, "Remote write committed");
                RemoteStatus::Committed {
                    revision,
                    stale_base,
                }
            }
            Err(e) => {
                error!(error = %e, "Remote write failed, local cache keeps the change");
                RemoteStatus::Failed(e.to_string())
            }
        };
        job.status.send_replace(status);
    }
}
