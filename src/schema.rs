//! Document encoding at the cache and remote boundaries
//!
//! All bytes coming out of a store pass through [`decode`], which validates the
//! shape, fills defaults for top-level fields missing from older documents and
//! lifts the document to [`SCHEMA_VERSION`].
//!
//! Decoding is per record. A record or top-level value that does not fit the
//! typed model is parked in [`AppState::unparsed`] and [`encode_value`] writes
//! it back unchanged, so a partial write never erases data another client stored.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::{
    Agreement, AppState, FormTemplate, MaintenanceTicket, Notification, Payment, Property,
    Settings, TenantApplication, Theme, Unparsed, User, SCHEMA_VERSION,
};

/// Top-level keys that default when absent or `null`.
const DEFAULTED_KEYS: &[&str] = &[
    "users",
    "properties",
    "agreements",
    "payments",
    "tickets",
    "notifications",
    "applications",
    "formTemplates",
    "theme",
    "settings",
];

type Fits = fn(&Value) -> bool;

const COLLECTIONS: &[(&str, Fits)] = &[
    ("users", fits::<User>),
    ("properties", fits::<Property>),
    ("agreements", fits::<Agreement>),
    ("payments", fits::<Payment>),
    ("tickets", fits::<MaintenanceTicket>),
    ("notifications", fits::<Notification>),
    ("applications", fits::<TenantApplication>),
    ("formTemplates", fits::<FormTemplate>),
];

const FIELDS: &[(&str, Fits)] = &[
    ("schemaVersion", fits::<u32>),
    ("currentUser", fits::<Option<User>>),
    ("theme", fits::<Theme>),
    ("settings", fits::<Settings>),
];

fn fits<T: DeserializeOwned>(value: &Value) -> bool {
    T::deserialize(value).is_ok()
}

pub fn encode(state: &AppState) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(&Value::Object(encode_value(state)?))?)
}

pub fn encode_value(state: &AppState) -> Result<Map<String, Value>, StoreError> {
    let mut map = match serde_json::to_value(state)? {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::Schema(format!(
                "app state encoded as {}, expected an object",
                kind_of(&other)
            )))
        }
    };

    if state.unparsed.is_empty() {
        return Ok(map);
    }

    for (key, raw) in &state.unparsed.records {
        if let Some(Value::Array(records)) = map.get_mut(key) {
            records.extend(raw.iter().cloned());
        }
    }

    // A parked field goes back out only while nobody has set the typed one.
    let defaults = serde_json::to_value(AppState::default())?;
    for (key, raw) in &state.unparsed.fields {
        if map.get(key) == defaults.get(key) {
            map.insert(key.clone(), raw.clone());
        }
    }

    Ok(map)
}

pub fn decode(bytes: &[u8]) -> Result<AppState, StoreError> {
    let value: Value = serde_json::from_slice(bytes)?;
    decode_value(value)
}

pub fn decode_value(value: Value) -> Result<AppState, StoreError> {
    let Value::Object(mut map) = value else {
        return Err(StoreError::Schema(format!(
            "app state must be an object, got {}",
            kind_of(&value)
        )));
    };

    // Older clients wrote explicit nulls for collections they had not populated yet.
    for key in DEFAULTED_KEYS {
        if map.get(*key).is_some_and(Value::is_null) {
            map.remove(*key);
        }
    }

    let unparsed = set_aside(&mut map);

    let mut state: AppState = serde_json::from_value(Value::Object(map))?;
    state.unparsed = unparsed;
    migrate(&mut state);
    Ok(state)
}

/// Move every value the typed model rejects out of `map`.
fn set_aside(map: &mut Map<String, Value>) -> Unparsed {
    let mut unparsed = Unparsed::default();

    for (key, fits) in COLLECTIONS {
        match map.get(*key) {
            None | Some(Value::Array(_)) => {}
            Some(_) => {
                warn!(key, "Collection is not an array, keeping it aside");
                if let Some(raw) = map.remove(*key) {
                    unparsed.fields.insert((*key).to_owned(), raw);
                }
                continue;
            }
        }
        let Some(Value::Array(records)) = map.get_mut(*key) else {
            continue;
        };

        let (good, bad): (Vec<Value>, Vec<Value>) =
            std::mem::take(records).into_iter().partition(|r| fits(r));
        *records = good;
        if !bad.is_empty() {
            warn!(key, count = bad.len(), "Records do not fit the model, keeping them aside");
            unparsed.records.insert((*key).to_owned(), bad);
        }
    }

    for (key, fits) in FIELDS {
        if map.get(*key).is_some_and(|v| !fits(v)) {
            warn!(key, "Field does not fit the model, using its default");
            if let Some(raw) = map.remove(*key) {
                unparsed.fields.insert((*key).to_owned(), raw);
            }
        }
    }

    unparsed
}

fn migrate(state: &mut AppState) {
    match state.schema_version {
        v if v == SCHEMA_VERSION => {}
        v if v < SCHEMA_VERSION => {
            debug!(from = v, to = SCHEMA_VERSION, "Migrated app state schema");
            state.schema_version = SCHEMA_VERSION;
        }
        v => {
            warn!(
                found = v,
                supported = SCHEMA_VERSION,
                "App state written by a newer schema, unknown fields are kept as-is"
            );
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApplicationStatus, Currency, TicketStatus, UserRole};

    #[test]
    fn legacy_document_is_backfilled() {
        let legacy = br#"{
            "users": [{"id":"u1","displayId":"u1","name":"Ada","email":"a@x.io","role":"AGENT"}],
            "properties": [],
            "currentUser": null,
            "theme": "light"
        }"#;
        let state = decode(legacy).unwrap();
        assert_eq!(state.schema_version, SCHEMA_VERSION);
        assert_eq!(state.users.len(), 1);
        assert!(state.form_templates.is_empty());
        assert_eq!(state.settings.localization.currency, Currency::NGN);
        assert_eq!(state.theme, Theme::Light);
    }

    #[test]
    fn null_collections_default() {
        let state = decode(br#"{"users":null,"settings":null,"formTemplates":null}"#).unwrap();
        assert!(state.users.is_empty());
        assert!(state.form_templates.is_empty());
        assert!(state.settings.notifications.push);
    }

    #[test]
    fn non_object_is_a_schema_error() {
        assert!(matches!(decode(b"[1,2,3]"), Err(StoreError::Schema(_))));
        assert!(matches!(decode(b"not json"), Err(StoreError::Json(_))));
    }

    #[test]
    fn encode_decode_is_lossless() {
        let mut state = AppState::default();
        let mut user = User::new("u1", "Ada", "a@x.io", UserRole::Agent);
        user.display_id = Some("AGT-ABC123".into());
        state.users.push(user.clone());
        state.current_user = Some(user);
        state.settings.localization.currency = Currency::EUR;

        let decoded = decode(&encode(&state).unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn newer_schema_version_is_preserved() {
        let state = decode(br#"{"schemaVersion": 9, "users": []}"#).unwrap();
        assert_eq!(state.schema_version, 9);
    }

    /// Document as the web client's save helpers wrote it.
    const WEB_CLIENT_DOC: &str = r#"{
        "users": [{"id":"u1","displayId":"AGT-ABC123","name":"Ada","email":"a@x.io","role":"AGENT"}],
        "tickets": [{"id":"t1","displayId":"REQ-AAAAAA","tenantId":"u2","propertyId":"p1",
                     "issue":"Leak","status":"pending","priority":"HIGH",
                     "createdAt":"2024-03-05T10:00:00.000Z"}],
        "applications": [{"id":"a1","displayId":"APP-AAAAAA","status":"pending",
                          "createdAt":"2024-03-05T10:00:00.000Z","firstName":"Bo"}],
        "currentUser": null,
        "theme": "dark"
    }"#;

    #[test]
    fn web_client_document_decodes() {
        let state = decode(WEB_CLIENT_DOC.as_bytes()).unwrap();
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.tickets.len(), 1);
        assert_eq!(state.tickets[0].status, TicketStatus::Open);
        assert_eq!(state.applications[0].status, ApplicationStatus::Pending);
        assert!(state.unparsed.is_empty());

        let back = encode_value(&state).unwrap();
        assert_eq!(back["tickets"][0]["status"], "OPEN");
        assert_eq!(back["applications"][0]["createdAt"], "2024-03-05T10:00:00.000Z");
    }

    #[test]
    fn malformed_record_is_kept_aside_not_fatal() {
        let doc = br#"{
            "users": [
                {"id":"u1","name":"Ada","role":"AGENT"},
                {"id":"u2","name":"Bo","role":"LANDLORD"}
            ],
            "properties": [{"id":"p1","rent":"a lot"}]
        }"#;
        let state = decode(doc).unwrap();
        assert_eq!(state.users.len(), 1);
        assert!(state.properties.is_empty());
        assert_eq!(state.unparsed.records["users"][0]["role"], "LANDLORD");

        let back = encode_value(&state).unwrap();
        assert_eq!(back["users"].as_array().unwrap().len(), 2);
        assert_eq!(back["properties"][0]["rent"], "a lot");

        // The cache path round-trips the same way.
        assert_eq!(decode(&encode(&state).unwrap()).unwrap(), state);
    }

    #[test]
    fn malformed_field_defaults_until_set() {
        let state = decode(br#"{"settings":{"localization":{"currency":"GBP"}},"users":[]}"#).unwrap();
        assert_eq!(state.settings, Settings::default());
        assert_eq!(
            encode_value(&state).unwrap()["settings"]["localization"]["currency"],
            "GBP"
        );

        let mut edited = state.clone();
        edited.settings.localization.currency = Currency::USD;
        assert_eq!(
            encode_value(&edited).unwrap()["settings"]["localization"]["currency"],
            "USD"
        );
    }
}
