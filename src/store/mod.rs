// Keywarden: Store Module
//
// SQLite persistence for SSH key records and their append-only audit trail.
// Private keys arrive here already sealed; the store never sees plaintext.

mod db;
mod error;
mod models;
mod repository;

pub use db::Database;
pub use error::StoreError;
pub use models::{
    Activation, AuditEvent, EventType, KeyRecord, KeyStatus, KeySummary, NewKeyRecord,
    SYSTEM_FINGERPRINT,
};
pub use repository::{KeyStore, SqliteKeyStore};
