//! Record creation helpers
//!
//! These mutate an [`AppState`] in memory; persist the result through
//! [`Synchronizer::update`](crate::sync::Synchronizer::update). New records go to
//! the front of their collection, the order the app lists them in.

use std::collections::HashSet;

use chrono::{SecondsFormat, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::ids::generate_display_id;
use crate::model::{
    AppState, ApplicationStatus, DisplayIdentified, MaintenanceTicket, Property, TenantApplication,
    TicketStatus, User,
};
use crate::repair::taken_display_ids;

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Insert or replace a user by internal id.
///
/// A known user keeps the display id already stored for them, whatever the
/// incoming record says. A new user gets a fresh one. The signed-in copy is
/// refreshed when it is the same user.
pub fn upsert_user<'a>(state: &'a mut AppState, mut user: User, max_attempts: u32) -> Result<&'a User, StoreError> {
    let index = match state.users.iter().position(|u| u.id == user.id) {
        Some(index) => {
            user.display_id = state.users[index].display_id.clone();
            state.users[index] = user;
            index
        }
        None => {
            let taken = taken_display_ids(&state.users, &state.unparsed, "users");
            let display_id = generate_display_id(user.id_kind(), &taken, max_attempts)?;
            debug!(id = %user.id, %display_id, "New user");
            user.display_id = Some(display_id);
            state.users.insert(0, user);
            0
        }
    };

    let stored = &state.users[index];
    if let Some(current) = state.current_user.as_mut() {
        if current.id == stored.id {
            *current = stored.clone();
        }
    }
    Ok(stored)
}

/// Add a property under a new internal id and `PROP-` display id.
pub fn add_property(state: &mut AppState, mut property: Property, max_attempts: u32) -> Result<&Property, StoreError> {
    let taken = taken_display_ids(&state.properties, &state.unparsed, "properties");
    assign_ids(&taken, &mut property, max_attempts)?;
    state.properties.insert(0, property);
    Ok(&state.properties[0])
}

/// File a maintenance request. It starts open and is stamped with the current time.
pub fn add_maintenance_request(
    state: &mut AppState,
    mut ticket: MaintenanceTicket,
    max_attempts: u32,
) -> Result<&MaintenanceTicket, StoreError> {
    let taken = taken_display_ids(&state.tickets, &state.unparsed, "tickets");
    assign_ids(&taken, &mut ticket, max_attempts)?;
    ticket.status = TicketStatus::Open;
    ticket.created_at = now_rfc3339();
    state.tickets.insert(0, ticket);
    Ok(&state.tickets[0])
}

pub fn add_application(
    state: &mut AppState,
    mut application: TenantApplication,
    max_attempts: u32,
) -> Result<&TenantApplication, StoreError> {
    let taken = taken_display_ids(&state.applications, &state.unparsed, "applications");
    assign_ids(&taken, &mut application, max_attempts)?;
    application.status = ApplicationStatus::Pending;
    application.submission_date = now_rfc3339();
    state.applications.insert(0, application);
    Ok(&state.applications[0])
}

fn assign_ids<T>(taken: &HashSet<String>, record: &mut T, max_attempts: u32) -> Result<(), StoreError>
where
    T: DisplayIdentified + HasId,
{
    let display_id = generate_display_id(record.id_kind(), taken, max_attempts)?;
    record.set_id(Uuid::new_v4().to_string());
    debug!(id = %record.id(), %display_id, "New record");
    record.set_display_id(display_id);
    Ok(())
}

trait HasId {
    fn set_id(&mut self, id: String);
}

impl HasId for Property {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl HasId for MaintenanceTicket {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl HasId for TenantApplication {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{is_well_formed, DEFAULT_MAX_ATTEMPTS};
    use crate::model::UserRole;

    fn property(name: &str) -> Property {
        serde_json::from_value(serde_json::json!({"id": "", "name": name})).unwrap()
    }

    #[test]
    fn new_user_goes_first_with_role_prefix() {
        let mut state = AppState::default();
        upsert_user(
            &mut state,
            User::new("u1", "Ada", "a@x.io", UserRole::Tenant),
            DEFAULT_MAX_ATTEMPTS,
        )
        .unwrap();
        let agent = upsert_user(
            &mut state,
            User::new("u2", "Bo", "b@x.io", UserRole::Agent),
            DEFAULT_MAX_ATTEMPTS,
        )
        .unwrap();

        assert!(agent.display_id.as_deref().unwrap().starts_with("AGT-"));
        assert_eq!(state.users[0].id, "u2");
        assert!(state.users[1]
            .display_id
            .as_deref()
            .unwrap()
            .starts_with("TNT-"));
    }

    #[test]
    fn existing_user_keeps_display_id() {
        let mut state = AppState::default();
        let first = upsert_user(
            &mut state,
            User::new("u1", "Ada", "a@x.io", UserRole::Tenant),
            DEFAULT_MAX_ATTEMPTS,
        )
        .unwrap()
        .clone();
        state.current_user = Some(first.clone());

        let mut edited = User::new("u1", "Ada L.", "a@x.io", UserRole::Tenant);
        edited.display_id = Some("TNT-ZZZZZZ".into());
        upsert_user(&mut state, edited, DEFAULT_MAX_ATTEMPTS).unwrap();

        assert_eq!(state.users.len(), 1);
        assert_eq!(state.users[0].name, "Ada L.");
        assert_eq!(state.users[0].display_id, first.display_id);
        assert_eq!(state.current_user.as_ref().unwrap().name, "Ada L.");
    }

    #[test]
    fn property_gets_uuid_and_prop_id() {
        let mut state = AppState::default();
        add_property(&mut state, property("Flat A"), DEFAULT_MAX_ATTEMPTS).unwrap();
        let added = add_property(&mut state, property("Flat B"), DEFAULT_MAX_ATTEMPTS).unwrap();

        assert_eq!(added.name, "Flat B");
        assert!(Uuid::parse_str(&added.id).is_ok());
        let display_id = added.display_id.clone().unwrap();
        assert!(display_id.starts_with("PROP-") && is_well_formed(&display_id));
        assert_eq!(state.properties[1].name, "Flat A");
        assert_ne!(state.properties[0].display_id, state.properties[1].display_id);
    }

    #[test]
    fn ticket_starts_open_and_stamped() {
        let mut state = AppState::default();
        let mut ticket: MaintenanceTicket =
            serde_json::from_str(r#"{"id":"","issue":"Leak","status":"RESOLVED"}"#).unwrap();
        ticket.priority = crate::model::TicketPriority::High;

        let added = add_maintenance_request(&mut state, ticket, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(added.status, TicketStatus::Open);
        assert!(added.display_id.as_deref().unwrap().starts_with("REQ-"));
        assert!(chrono::DateTime::parse_from_rfc3339(&added.created_at).is_ok());
    }

    #[test]
    fn application_starts_pending() {
        let mut state = AppState::default();
        let application = TenantApplication {
            first_name: "Ada".into(),
            status: ApplicationStatus::Approved,
            ..Default::default()
        };

        let added = add_application(&mut state, application, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(added.status, ApplicationStatus::Pending);
        assert!(added.display_id.as_deref().unwrap().starts_with("APP-"));
        assert!(!added.submission_date.is_empty());
    }

    #[test]
    fn legacy_pending_ticket_lists_with_open_requests() {
        let doc = br#"{"tickets":[{"id":"t0","issue":"Door","status":"pending"}]}"#;
        let mut state = crate::schema::decode(doc).unwrap();
        let ticket: MaintenanceTicket =
            serde_json::from_str(r#"{"id":"","issue":"Leak"}"#).unwrap();
        add_maintenance_request(&mut state, ticket, DEFAULT_MAX_ATTEMPTS).unwrap();

        assert!(state.tickets.iter().all(|t| t.status == TicketStatus::Open));
        let written = serde_json::to_value(&state.tickets).unwrap();
        assert_eq!(written[0]["status"], "OPEN");
        assert_eq!(written[1]["status"], "OPEN");
    }

    #[test]
    fn new_record_avoids_parked_display_id() {
        let mut state = AppState::default();
        state.unparsed.records.insert(
            "properties".into(),
            vec![serde_json::json!({"id": "p0", "displayId": "PROP-AAAAAA", "rent": "n/a"})],
        );
        add_property(&mut state, property("Flat"), DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_ne!(state.properties[0].display_id.as_deref(), Some("PROP-AAAAAA"));
        assert!(state.unparsed.records["properties"].len() == 1);
    }
}
