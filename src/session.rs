//! Sign-in and sign-out against the synchronized state
//!
//! Authentication itself happens elsewhere; this only receives the
//! authenticated UID and records who is signed in.

use tracing::info;

use crate::error::StoreError;
use crate::model::User;
use crate::repair::{self, RepairReport};
use crate::sync::{Synchronizer, WriteTicket};

/// Result of a successful sign-in.
#[derive(Debug)]
pub struct SignIn {
    pub user: User,
    /// Empty unless this sign-in ran the session's repair pass and it changed something.
    pub repair: RepairReport,
    pub ticket: WriteTicket,
}

/// Sign in the user whose internal id is `uid`.
///
/// The first sign-in on a synchronizer also runs the repair pass; the repaired
/// document and the new `currentUser` go out in a single write.
///
/// Must be called within a tokio runtime. Outside one it fails with
/// [`StoreError::Task`] and writes nothing.
pub fn sign_in(sync: &Synchronizer, uid: &str) -> Result<SignIn, StoreError> {
    let mut state = sync.read();
    if state.user(uid).is_none() {
        return Err(StoreError::UnknownUser(uid.to_owned()));
    }

    let claimed = sync.claim_session_repair();
    let report = if claimed {
        match repair::repair_in_place(&mut state, sync.max_id_attempts()) {
            Ok(report) => report,
            Err(e) => {
                sync.release_session_repair();
                return Err(e);
            }
        }
    } else {
        RepairReport::default()
    };

    let user = state
        .user(uid)
        .cloned()
        .ok_or_else(|| StoreError::UnknownUser(uid.to_owned()))?;
    state.current_user = Some(user.clone());

    let ticket = match sync.write(state) {
        Ok(ticket) => ticket,
        Err(e) => {
            if claimed {
                sync.release_session_repair();
            }
            return Err(e);
        }
    };
    info!(
        uid,
        display_id = user.display_id.as_deref().unwrap_or_default(),
        repaired = report.changes.len(),
        "Signed in"
    );

    Ok(SignIn {
        user,
        repair: report,
        ticket,
    })
}

/// Clear `currentUser`. The cache reflects it at once even if the remote write fails.
///
/// Must be called within a tokio runtime, like [`sign_in`].
pub fn sign_out(sync: &Synchronizer) -> Result<WriteTicket, StoreError> {
    let state = sync.read().signed_out();
    let ticket = sync.write(state)?;
    info!("Signed out");
    Ok(ticket)
}
