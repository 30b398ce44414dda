//! Data model for the synchronized app state
//!
//! The whole app lives in one document, [`AppState`]. It is the only unit of
//! synchronization: every write persists the entire document.

pub mod entities;
pub mod settings;
pub mod state;

pub use entities::{
    Agreement, AgreementStatus, ApplicationStatus, DisplayIdentified, FieldType, FormField,
    FormSection, FormTemplate, MaintenanceTicket, Notification, NotificationType, Payment,
    PaymentStatus, Property, PropertyCategory, PropertyStatus, TenantApplication, TicketPriority,
    TicketStatus, User, UserRole,
};
pub use settings::{
    AppearanceSettings, Currency, DateFormat, Density, LocalizationSettings, NotificationSettings,
    Settings,
};
pub use state::{AppState, Theme, Unparsed, SCHEMA_VERSION};
