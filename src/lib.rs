//! Versioned Field Store
//!
//! Records the evolving values of the attributes of budget-planning entities
//! without ever overwriting anything, and detects lost updates between
//! concurrent editors.
//!
//! ## Features
//!
//! - **Append-only series**: every edit appends a [`VersionRecord`]; nothing is mutated
//! - **Derived current value**: the latest value is recomputed from the series on each read
//! - **Deterministic ordering**: records order by `(timestamp, seq)`, so ties still resolve
//! - **Conflict detection**: report versions committed after a client's last-seen timestamp
//! - **Compare-and-append**: check and append under one lock to close the check-then-write race
//! - **Durable journal**: optional checksummed JSON-lines log; a batch replays whole or not at all
//!
//! ## Layout
//!
//! ```text
//! (entity_type, entity_id, field_name, lane)   one series
//! ├── v1  "Alpha"  2024-01-01T10:00:00Z  seq 1  user#3
//! ├── v2  "Beta"   2024-01-01T10:05:00Z  seq 9  user#4
//! └── …                                         newest = max (timestamp, seq)
//! ```
//!
//! Values live in one of three lanes: text, numeric (two decimal places) or
//! foreign key (string code or integer id). [`FieldSchema`] decides which
//! lane a field uses.

pub mod checksum;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod editor;
pub mod error;
pub mod history;
pub mod journal;
pub mod record;
pub mod resolve;
pub mod schema;
pub mod store;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use conflict::{Conflict, Precondition};
pub use editor::{
    AuthProvider, CellEditor, CellUpdate, EntityRegistrar, FixedActor, InMemoryRegistrar,
};
pub use error::{Result, StoreError};
pub use record::{EntityType, HistoryEntry, SeriesKey, UserId, VersionRecord};
pub use schema::FieldSchema;
pub use store::VersionStore;
pub use value::{CellValue, FieldKind, FieldValue, Lane};
