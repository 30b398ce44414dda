//! Display id repair pass
//!
//! Run once per session after sign-in. Records created before display ids
//! existed carry none, an empty one, or a copy of their internal id; those
//! get a freshly generated id. A display id that repeats within a collection
//! keeps its first holder and is regenerated for the rest.

use std::collections::HashSet;

use tracing::debug;

use crate::error::StoreError;
use crate::ids::generate_display_id;
use crate::model::{AppState, DisplayIdentified, Unparsed};

/// One rewritten display id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairChange {
    pub collection: &'static str,
    pub id: String,
    pub old: Option<String>,
    pub new: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub changes: Vec<RepairChange>,
}

impl RepairReport {
    pub fn was_modified(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Repair a state by value.
pub fn repair(mut state: AppState, max_attempts: u32) -> Result<(AppState, RepairReport), StoreError> {
    let report = repair_in_place(&mut state, max_attempts)?;
    Ok((state, report))
}

pub fn repair_in_place(state: &mut AppState, max_attempts: u32) -> Result<RepairReport, StoreError> {
    let mut changes = Vec::new();

    let parked = &state.unparsed;
    repair_collection("users", &mut state.users, parked, max_attempts, &mut changes)?;
    repair_collection("properties", &mut state.properties, parked, max_attempts, &mut changes)?;
    repair_collection("tickets", &mut state.tickets, parked, max_attempts, &mut changes)?;
    repair_collection("applications", &mut state.applications, parked, max_attempts, &mut changes)?;

    // The signed-in user is a copy; keep it in step with its record.
    if let Some(current) = state.current_user.as_mut() {
        if let Some(record) = state.users.iter().find(|u| u.id == current.id) {
            if record.display_id != current.display_id {
                changes.push(RepairChange {
                    collection: "currentUser",
                    id: current.id.clone(),
                    old: current.display_id.clone(),
                    new: record.display_id.clone().unwrap_or_default(),
                });
                current.display_id = record.display_id.clone();
            }
        }
    }

    Ok(RepairReport { changes })
}

/// Display ids in `records` that are present and not legacy.
pub fn collect_display_ids<T: DisplayIdentified>(records: &[T]) -> HashSet<String> {
    records
        .iter()
        .filter(|r| !r.needs_display_id())
        .filter_map(|r| r.display_id().map(str::to_owned))
        .collect()
}

/// Display ids held by records of `collection` that were set aside while decoding.
pub fn parked_display_ids(unparsed: &Unparsed, collection: &str) -> HashSet<String> {
    unparsed
        .records
        .get(collection)
        .into_iter()
        .flatten()
        .filter_map(|r| r.get("displayId")?.as_str())
        .map(str::to_owned)
        .collect()
}

/// Every display id a new record of `collection` must avoid.
pub fn taken_display_ids<T: DisplayIdentified>(
    records: &[T],
    unparsed: &Unparsed,
    collection: &str,
) -> HashSet<String> {
    let mut taken = collect_display_ids(records);
    taken.extend(parked_display_ids(unparsed, collection));
    taken
}

fn repair_collection<T: DisplayIdentified>(
    collection: &'static str,
    records: &mut [T],
    parked: &Unparsed,
    max_attempts: u32,
    changes: &mut Vec<RepairChange>,
) -> Result<(), StoreError> {
    let mut taken = HashSet::new();
    let mut pending = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match record.display_id() {
            Some(display_id) if !record.needs_display_id() => {
                if !taken.insert(display_id.to_owned()) {
                    pending.push(index);
                }
            }
            _ => pending.push(index),
        }
    }

    // Parked records keep their ids; new ones must not reuse them.
    taken.extend(parked_display_ids(parked, collection));

    for index in pending {
        let record = &mut records[index];
        let fresh = generate_display_id(record.id_kind(), &taken, max_attempts)?;
        taken.insert(fresh.clone());

        debug!(collection, id = %record.id(), display_id = %fresh, "Assigned display id");
        changes.push(RepairChange {
            collection,
            id: record.id().to_owned(),
            old: record.display_id().map(str::to_owned),
            new: fresh.clone(),
        });
        record.set_display_id(fresh);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{is_well_formed, DEFAULT_MAX_ATTEMPTS};
    use crate::model::{MaintenanceTicket, Property, User, UserRole};

    fn user(id: &str, display_id: Option<&str>, role: UserRole) -> User {
        let mut user = User::new(id, "name", format!("{id}@x.io"), role);
        user.display_id = display_id.map(str::to_owned);
        user
    }

    #[test]
    fn legacy_agent_gets_fresh_agt_id() {
        let mut state = AppState::default();
        state.users.push(user("u1", Some("u1"), UserRole::Agent));

        let (repaired, report) = repair(state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert!(report.was_modified());

        let display_id = repaired.users[0].display_id.clone().unwrap();
        assert_ne!(display_id, "u1");
        assert!(display_id.starts_with("AGT-"));
        assert!(is_well_formed(&display_id));
    }

    #[test]
    fn missing_and_empty_ids_are_rewritten() {
        let mut state = AppState::default();
        state.users.push(user("u1", None, UserRole::Tenant));
        state.users.push(user("u2", Some(""), UserRole::Admin));

        let report = repair_in_place(&mut state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(report.changes.len(), 2);
        for u in &state.users {
            assert!(u.display_id.as_deref().unwrap().starts_with("TNT-"));
        }
    }

    #[test]
    fn valid_ids_are_untouched() {
        let mut state = AppState::default();
        state
            .users
            .push(user("u1", Some("AGT-ABC123"), UserRole::Agent));
        state.users.push(user("u2", Some("u2"), UserRole::Tenant));

        repair_in_place(&mut state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(state.users[0].display_id.as_deref(), Some("AGT-ABC123"));
        assert_ne!(state.users[1].display_id.as_deref(), Some("u2"));
    }

    #[test]
    fn repair_is_idempotent() {
        let mut state = AppState::default();
        for i in 0..20 {
            let id = format!("u{i}");
            state.users.push(user(&id, Some(&id), UserRole::Agent));
        }
        state.properties.push(Property {
            id: "p1".into(),
            display_id: None,
            name: "Flat".into(),
            location: "Lagos".into(),
            rent: 1.0,
            status: Default::default(),
            agent_id: "u1".into(),
            tenant_id: None,
            description: None,
            category: Default::default(),
            property_type: "Shop".into(),
            rent_start_date: None,
            rent_expiry_date: None,
            images: vec![],
            extra: Default::default(),
        });

        let (once, first) = repair(state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(first.changes.len(), 21);

        let (twice, second) = repair(once.clone(), DEFAULT_MAX_ATTEMPTS).unwrap();
        assert!(!second.was_modified());
        assert_eq!(once, twice);
    }

    #[test]
    fn batch_repairs_never_collide() {
        let mut state = AppState::default();
        for i in 0..50 {
            state.users.push(user(&format!("u{i}"), None, UserRole::Tenant));
        }
        repair_in_place(&mut state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(collect_display_ids(&state.users).len(), 50);
    }

    #[test]
    fn duplicates_keep_first_holder() {
        let mut state = AppState::default();
        state.users.push(user("u1", Some("TNT-AAAAAA"), UserRole::Tenant));
        state.users.push(user("u2", Some("TNT-AAAAAA"), UserRole::Tenant));

        let report = repair_in_place(&mut state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].id, "u2");
        assert_eq!(state.users[0].display_id.as_deref(), Some("TNT-AAAAAA"));
        assert_ne!(state.users[1].display_id.as_deref(), Some("TNT-AAAAAA"));
    }

    #[test]
    fn current_user_follows_its_record() {
        let mut state = AppState::default();
        let legacy = user("u1", Some("u1"), UserRole::Agent);
        state.users.push(legacy.clone());
        state.current_user = Some(legacy);

        repair_in_place(&mut state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(
            state.current_user.as_ref().unwrap().display_id,
            state.users[0].display_id
        );
    }

    #[test]
    fn tickets_get_req_prefix() {
        let mut state = AppState::default();
        let ticket: MaintenanceTicket =
            serde_json::from_str(r#"{"id":"t1","issue":"Leak"}"#).unwrap();
        state.tickets.push(ticket);

        repair_in_place(&mut state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert!(state.tickets[0]
            .display_id
            .as_deref()
            .unwrap()
            .starts_with("REQ-"));
    }

    #[test]
    fn fresh_ids_avoid_parked_records() {
        let mut state = AppState::default();
        state.users.push(user("u1", None, UserRole::Tenant));
        state.unparsed.records.insert(
            "users".into(),
            vec![serde_json::json!({"id": "u9", "displayId": "TNT-AAAAAA", "role": "LANDLORD"})],
        );

        repair_in_place(&mut state, DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_ne!(state.users[0].display_id.as_deref(), Some("TNT-AAAAAA"));
        assert!(taken_display_ids(&state.users, &state.unparsed, "users").contains("TNT-AAAAAA"));
    }
}
