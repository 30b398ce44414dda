//! Entity records stored in the app state collections
//!
//! Wire names follow the document format written by the web client (camelCase
//! fields, SCREAMING_CASE enums). Fields the client may omit default so that
//! older records still decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::IdKind;

/// A record that carries both an internal id and a human-facing display id.
pub trait DisplayIdentified {
    /// Internal identifier, opaque and stable.
    fn id(&self) -> &str;

    fn display_id(&self) -> Option<&str>;

    fn set_display_id(&mut self, display_id: String);

    /// Which prefix a freshly generated display id gets.
    fn id_kind(&self) -> IdKind;

    /// True when the display id is missing, empty, or still the legacy copy of `id`.
    fn needs_display_id(&self) -> bool {
        match self.display_id() {
            None => true,
            Some(display_id) => display_id.is_empty() || display_id == self.id(),
        }
    }
}

macro_rules! display_identified {
    ($ty:ty, $kind:expr) => {
        impl DisplayIdentified for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn display_id(&self) -> Option<&str> {
                self.display_id.as_deref()
            }

            fn set_display_id(&mut self, display_id: String) {
                self.display_id = Some(display_id);
            }

            fn id_kind(&self) -> IdKind {
                $kind(self)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Agent,
    #[default]
    Tenant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_property_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    /// Record fields this version does not model. Written back unchanged.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            display_id: None,
            name: name.into(),
            email: email.into(),
            role,
            assigned_property_id: None,
            phone: None,
            profile_picture_url: None,
            extra: BTreeMap::new(),
        }
    }
}

display_identified!(User, |user: &User| IdKind::for_role(user.role));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyStatus {
    #[default]
    Draft,
    Listed,
    Occupied,
    Vacant,
    Archived,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyCategory {
    #[default]
    Residential,
    Commercial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub rent: f64,
    #[serde(default)]
    pub status: PropertyStatus,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub category: PropertyCategory,
    /// Free-form listing type ("2 Bedroom flat", "Shop", ...).
    #[serde(rename = "type", default)]
    pub property_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rent_start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rent_expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

display_identified!(Property, |_: &Property| IdKind::Property);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementStatus {
    #[default]
    Active,
    Expired,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    pub id: String,
    #[serde(default)]
    pub property_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(default)]
    pub status: AgreementStatus,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    #[default]
    Pending,
    Late,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub property_id: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub status: PaymentStatus,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Also read from the lowercase `pending` some clients stored for new requests.
    #[default]
    #[serde(alias = "pending", alias = "open")]
    Open,
    #[serde(alias = "in_progress")]
    InProgress,
    #[serde(alias = "resolved")]
    Resolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceTicket {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub property_id: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

display_identified!(MaintenanceTicket, |_: &MaintenanceTicket| IdKind::Request);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    #[default]
    #[serde(alias = "pending")]
    Pending,
    Reviewing,
    Approved,
    Rejected,
    MoreInfoRequired,
}

/// A tenant's application for a property.
///
/// Core fields map the standard form; agent-defined fields land in `custom_responses`
/// keyed by form field id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TenantApplication {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
    pub user_id: String,
    pub property_id: String,
    pub agent_id: String,
    pub status: ApplicationStatus,
    pub submission_date: String,

    pub first_name: String,
    pub surname: String,
    pub middle_name: String,
    pub dob: String,
    pub marital_status: String,
    pub gender: String,
    pub current_home_address: String,
    pub occupation: String,
    pub family_size: u32,
    pub phone_number: String,
    pub reason_for_relocating: String,
    pub current_landlord_name: String,
    pub current_landlord_phone: String,
    pub verification_type: String,
    pub verification_id_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_photo_url: Option<String>,
    /// Display id of the agent the applicant was referred by.
    pub agent_id_code: String,
    pub signature: String,
    pub application_date: String,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_responses: BTreeMap<String, Value>,

    pub risk_score: f64,
    pub ai_recommendation: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

display_identified!(TenantApplication, |_: &TenantApplication| IdKind::Application);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Date,
    Select,
    Textarea,
    File,
    Email,
    Tel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormField {
    pub id: String,
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSection {
    pub id: String,
    pub title: String,
    pub icon: String,
    pub fields: Vec<FormField>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// An agent's custom application form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormTemplate {
    pub agent_id: String,
    pub sections: Vec<FormSection>,
    pub last_updated: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
