//! The aggregate app state document

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entities::{
    Agreement, FormTemplate, MaintenanceTicket, Notification, Payment, Property,
    TenantApplication, User,
};
use super::settings::Settings;

/// Current document schema revision.
///
/// Version 1 documents predate `schemaVersion`, `settings` and `formTemplates`.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// The single synchronized document.
///
/// Every top-level field carries its own default so that a document written
/// by an older client decodes with the missing collections filled in.
/// Top-level keys this version does not know are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub agreements: Vec<Agreement>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub tickets: Vec<MaintenanceTicket>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub applications: Vec<TenantApplication>,
    #[serde(default)]
    pub form_templates: Vec<FormTemplate>,
    /// Signed-in user. Serialized as `null` on logout, never omitted.
    #[serde(default)]
    pub current_user: Option<User>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub settings: Settings,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Stored values that did not fit the typed model. Filled and re-emitted by `schema`.
    #[serde(skip)]
    pub unparsed: Unparsed,
    /// Remote revision this copy was read at; 0 when the cache has not seen
    /// the remote yet. Set by the synchronizer, never stored.
    #[serde(skip)]
    pub base_revision: u64,
}

/// Raw JSON set aside while decoding so one malformed record cannot sink the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unparsed {
    /// Records per collection key, in stored order.
    pub records: BTreeMap<String, Vec<serde_json::Value>>,
    /// Other top-level values. The typed field holds its default meanwhile.
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Unparsed {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.fields.is_empty()
    }
}

fn legacy_schema_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            users: Vec::new(),
            properties: Vec::new(),
            agreements: Vec::new(),
            payments: Vec::new(),
            tickets: Vec::new(),
            notifications: Vec::new(),
            applications: Vec::new(),
            form_templates: Vec::new(),
            current_user: None,
            theme: Theme::Dark,
            settings: Settings::default(),
            extra: BTreeMap::new(),
            unparsed: Unparsed::default(),
            base_revision: 0,
        }
    }
}

impl AppState {
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_by_display_id(&self, display_id: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.display_id.as_deref() == Some(display_id))
    }

    /// Copy of the state with the session cleared.
    pub fn signed_out(&self) -> Self {
        Self {
            current_user: None,
            ..self.clone()
        }
    }
}
