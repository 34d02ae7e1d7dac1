//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - reflection(id, name, is_flow_state, engagement, energy, date, note, axis_id)
//! - axis(id, name, is_hidden)
//! - tag(reflection_id, name)
//!
//! The schema version lives in the database header and is advanced or
//! reverted by the migration engine.

pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use migrations::{MigrationReport, BACKUP_SUFFIX};
pub use schema::SCHEMA_VERSION;
pub use sqlite::{DbStats, SqliteStore};
