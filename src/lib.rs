//! prop-lifecycle-store - cache-first state synchronization for the property lifecycle app
//!
//! The app keeps everything in one JSON document. Each device holds a copy in
//! a local cache that reads are served from; writes land there first and are
//! then persisted to the shared remote document, whose changes stream back to
//! every subscribed device.
//!
//! ```text
//!   UI ──read()──▶ ┌──────────────┐ ◀──overwrite── ┌──────────────┐
//!                  │  LocalCache  │                │ RemoteStore  │
//!   UI ──write()─▶ │  (sled)      │ ──persist────▶ │ (SQLite doc) │
//!                  └──────────────┘                └──────────────┘
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/prop-lifecycle/
//! ├── cache.sled/     # per-device snapshot, key `prop_lifecycle_data`
//! ├── remote.db       # shared document `prop_lifecycle/app_state`
//! └── config.toml
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod ids;
pub mod model;
pub mod records;
pub mod remote;
pub mod repair;
pub mod schema;
pub mod session;
pub mod sync;

// Re-exports
pub use cache::{LocalCache, SledCache, SledCacheConfig};
pub use config::Config;
pub use error::StoreError;
pub use format::{format_currency, format_date};
pub use ids::{generate_display_id, IdKind};
pub use model::{AppState, Settings, User, UserRole};
pub use remote::{RemoteSnapshot, RemoteStore, SqliteRemote, SqliteRemoteConfig, Subscription, SubscriptionState};
pub use repair::{RepairChange, RepairReport};
pub use session::{sign_in, sign_out, SignIn};
pub use sync::{LocalStatus, RemoteStatus, Synchronizer, WriteTicket};
