//! Two-phase write results
//!
//! A write is applied to the local cache before `write()` returns; the remote
//! phase resolves later. Callers can check both independently.

use std::fmt;

use tokio::sync::watch;

/// Outcome of the local phase. A failed local write surfaces as an `Err` from
/// `write()` instead, so a ticket always starts from an applied cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    Applied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Pending,
    Committed {
        revision: u64,
        /// Another writer committed between the last revision this device saw
        /// and this write.
        stale_base: bool,
    },
    Failed(String),
}

impl RemoteStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Committed {
                revision,
                stale_base: false,
            } => write!(f, "committed at revision {revision}"),
            Self::Committed {
                revision,
                stale_base: true,
            } => write!(f, "committed at revision {revision} over a newer remote base"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Handle returned by a write.
#[derive(Debug, Clone)]
pub struct WriteTicket {
    local: LocalStatus,
    remote: watch::Receiver<RemoteStatus>,
}

impl WriteTicket {
    pub(crate) fn new(remote: watch::Receiver<RemoteStatus>) -> Self {
        Self {
            local: LocalStatus::Applied,
            remote,
        }
    }

    /// A ticket whose remote phase was never needed.
    #[cfg(test)]
    pub(crate) fn settled(status: RemoteStatus) -> Self {
        let (_tx, rx) = watch::channel(status);
        Self::new(rx)
    }

    pub fn local(&self) -> LocalStatus {
        self.local
    }

    /// Remote phase as of now.
    pub fn remote(&self) -> RemoteStatus {
        self.remote.borrow().clone()
    }

    /// Wait for the remote phase to resolve.
    pub async fn remote_settled(&self) -> RemoteStatus {
        let mut rx = self.remote.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_settled() {
                return current;
            }
            if rx.changed().await.is_err() {
                // Sender gone without settling; report what we last saw
                let last = rx.borrow().clone();
                return if last.is_settled() {
                    last
                } else {
                    RemoteStatus::Failed("remote write abandoned".into())
                };
            }
        }
    }
}
