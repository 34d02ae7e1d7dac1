//! # Flowlog - Flow-state journal engine
//!
//! Persistence and synchronization core for a personal reflection tracker.
//!
//! Flowlog provides:
//! - SQLite-backed storage of reflections, axes ("views") and tags
//! - Ordered, reversible schema migrations with a pre-migration backup
//! - A synchronized in-memory cache (`Store`) fed by one background worker
//! - A deferred rename queue drained before every mutation
//! - Schema-versioned, transactional import/export
//! - Aggregate reports (averages, best/worst rankings)

pub mod reflection;
pub mod report;
pub mod storage;
pub mod rename;
pub mod store;
pub mod codec;
pub mod preferences;
pub mod output;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use reflection::{Axis, Reflection};
pub use report::{Averaged, Category, Direction, Filter, Metric};
pub use storage::SqliteStore;
pub use rename::{Rename, RenameKind, RenameQueue};
pub use store::{Pending, Snapshot, Store, SyncOutcome};

use std::fmt;
use std::path::PathBuf;

/// Result type alias for Flowlog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which entry point started a migration walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOrigin {
    /// Opening a store at a target version
    Open,
    /// An explicit `migrate` call on an opened store
    Migrate,
}

impl fmt::Display for MigrationOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOrigin::Open => write!(f, "open"),
            MigrationOrigin::Migrate => write!(f, "migrate"),
        }
    }
}

/// Error types for Flowlog operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot open store at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Prepare error: {0}")]
    Prepare(#[source] rusqlite::Error),

    #[error("Step error: {0}")]
    Step(#[source] rusqlite::Error),

    #[error("Bind error: {0}")]
    Bind(#[source] rusqlite::Error),

    #[error("Migration to version {version} failed during {origin}: {source}")]
    Migration {
        origin: MigrationOrigin,
        version: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Unsupported schema version: {0}")]
    UnsupportedSchema(u32),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Invalid reflection: {0}")]
    InvalidReflection(String),

    #[error("Reflection not found: {0}")]
    ReflectionNotFound(i64),

    #[error("Axis not found: {0}")]
    AxisNotFound(String),

    #[error("Store worker has shut down")]
    StoreClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Unspecified(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::Error as Sql;
        use rusqlite::ErrorCode;

        match &err {
            Sql::InvalidParameterName(_)
            | Sql::InvalidParameterCount(_, _)
            | Sql::ToSqlConversionFailure(_)
            | Sql::NulError(_) => Error::Bind(err),
            Sql::InvalidQuery | Sql::MultipleStatement => Error::Prepare(err),
            Sql::SqliteFailure(e, _) if e.code == ErrorCode::Unknown => Error::Prepare(err),
            Sql::SqliteFailure(_, _)
            | Sql::ExecuteReturnedResults
            | Sql::QueryReturnedNoRows
            | Sql::StatementChangedRows(_) => Error::Step(err),
            _ => Error::Unspecified(Box::new(err)),
        }
    }
}

impl Error {
    /// True when the underlying driver reported a constraint violation
    /// (unique, check, or foreign key).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Error::Step(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            Error::Migration { source, .. } => source.is_constraint_violation(),
            _ => false,
        }
    }
}
