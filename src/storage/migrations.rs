//! Migration engine
//!
//! Brings a store from its persisted version to a target version one step at
//! a time. The version lives in the SQLite header (`PRAGMA user_version`) and
//! is written inside the same transaction as the step it records, so a crash
//! mid-walk leaves the store at the last fully applied version.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction};
use serde::Serialize;

use super::schema::{self, Step, SCHEMA_VERSION};
use crate::{Error, MigrationOrigin, Result};

/// Suffix appended to the store file name for the pre-migration copy
pub const BACKUP_SUFFIX: &str = ".before-migration";

/// What a migration walk did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    /// Versions whose step ran, in the order they ran
    pub applied: Vec<u32>,
    pub backup: Option<PathBuf>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Direction of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Way {
    Up,
    Down,
}

/// Path of the backup copy for a store file
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Read the persisted schema version
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version.max(0) as u32)
}

/// Open (or create) the store at `path` and walk it to `target`.
///
/// A file that does not exist yet is created as `target`'s initial shape and
/// gets no backup. An existing file at another version is copied to its
/// backup location before the first step runs.
pub fn open(path: &Path, target: u32) -> Result<(Connection, MigrationReport)> {
    let fresh = !path.exists();
    let mut conn = Connection::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let backup = if fresh { None } else { Some(path) };
    let report = migrate(&mut conn, target, backup, MigrationOrigin::Open)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok((conn, report))
}

/// Open an in-memory store at `target` (for testing)
pub fn open_in_memory(target: u32) -> Result<(Connection, MigrationReport)> {
    let mut conn = Connection::open_in_memory().map_err(|source| Error::Open {
        path: PathBuf::from(":memory:"),
        source,
    })?;
    let report = migrate(&mut conn, target, None, MigrationOrigin::Open)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok((conn, report))
}

/// Walk `conn` from its current version to `target`.
///
/// `backup` names the store file to copy before the first step; pass `None`
/// for fresh or in-memory stores. Foreign-key enforcement is switched off
/// for the walk (table rebuilds need it) and restored to its previous state
/// afterward, including on failure.
pub fn migrate(
    conn: &mut Connection,
    target: u32,
    backup: Option<&Path>,
    origin: MigrationOrigin,
) -> Result<MigrationReport> {
    let wrap = |version: u32, err: Error| Error::Migration {
        origin,
        version,
        source: Box::new(err),
    };

    if target > SCHEMA_VERSION {
        return Err(wrap(target, Error::UnsupportedSchema(target)));
    }

    let from = current_version(conn).map_err(|e| wrap(target, e))?;
    if from > SCHEMA_VERSION {
        return Err(wrap(target, Error::UnsupportedSchema(from)));
    }

    let mut report = MigrationReport {
        from,
        to: from,
        applied: Vec::new(),
        backup: None,
    };
    if from == target {
        tracing::debug!("Schema already at version {}", target);
        return Ok(report);
    }

    if let Some(path) = backup {
        let dest = backup_path(path);
        std::fs::copy(path, &dest).map_err(|e| wrap(target, e.into()))?;
        tracing::info!("Backed up {} to {}", path.display(), dest.display());
        report.backup = Some(dest);
    }

    let fk_enabled: bool = conn
        .pragma_query_value(None, "foreign_keys", |row| row.get(0))
        .map_err(|e| wrap(target, e.into()))?;
    conn.pragma_update(None, "foreign_keys", "OFF")
        .map_err(|e| wrap(target, e.into()))?;

    let result = walk(conn, from, target, &mut report);

    let restored = conn.pragma_update(None, "foreign_keys", if fk_enabled { "ON" } else { "OFF" });
    match result {
        Ok(()) => {
            restored.map_err(|e| wrap(target, e.into()))?;
            Ok(report)
        }
        Err((version, err)) => {
            tracing::error!("Migration step {} failed: {}", version, err);
            Err(wrap(version, err))
        }
    }
}

fn walk(
    conn: &mut Connection,
    from: u32,
    target: u32,
    report: &mut MigrationReport,
) -> std::result::Result<(), (u32, Error)> {
    let steps = schema::steps();
    let plan: Vec<(u32, Way)> = if target > from {
        ((from + 1)..=target).map(|v| (v, Way::Up)).collect()
    } else {
        ((target + 1)..=from).rev().map(|v| (v, Way::Down)).collect()
    };

    for (version, way) in plan {
        let step = steps
            .get(&version)
            .ok_or((version, Error::UnsupportedSchema(version)))?;
        apply_step(conn, step, way).map_err(|e| (version, e))?;
        report.applied.push(version);
        report.to = match way {
            Way::Up => version,
            Way::Down => version - 1,
        };
    }
    Ok(())
}

fn apply_step(conn: &mut Connection, step: &Step, way: Way) -> Result<()> {
    let (statements, resulting) = match way {
        Way::Up => (step.up, step.version),
        Way::Down => (step.down, step.version - 1),
    };
    tracing::info!(
        "Running migration {:?} v{}: {}",
        way,
        step.version,
        step.description
    );

    let tx = conn.transaction()?;
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    check_foreign_keys(&tx)?;
    tx.pragma_update(None, "user_version", resulting)?;
    tx.commit()?;
    Ok(())
}

fn check_foreign_keys(tx: &Transaction<'_>) -> Result<()> {
    let mut stmt = tx.prepare("PRAGMA foreign_key_check")?;
    let violations = stmt.query_map([], |row| row.get::<_, String>(0))?.count();
    if violations > 0 {
        return Err(Error::Unspecified(
            format!("{} foreign key violation(s) after step", violations).into(),
        ));
    }
    Ok(())
}

/// Structural shape of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub name: String,
    /// (name, declared type, not null, default, primary-key position)
    pub columns: Vec<(String, String, bool, Option<String>, i64)>,
    /// (referenced table, from column, to column, on update, on delete)
    pub foreign_keys: Vec<(String, String, Option<String>, String, String)>,
    /// (index name, unique)
    pub indexes: Vec<(String, bool)>,
}

/// Structural fingerprint of every user table, sorted by name.
///
/// Compares shapes rather than `sqlite_master.sql` text, because a table
/// rebuilt through `ALTER TABLE ... RENAME` keeps a quoted name in its SQL.
pub fn schema_fingerprint(conn: &Connection) -> Result<Vec<TableShape>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut shapes = Vec::with_capacity(tables.len());
    for name in tables {
        let mut cols = conn.prepare("SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)")?;
        let columns = cols
            .query_map([&name], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut fks = conn.prepare(
            "SELECT \"table\", \"from\", \"to\", on_update, on_delete FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let foreign_keys = fks
            .query_map([&name], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut idx = conn.prepare("SELECT name, \"unique\" FROM pragma_index_list(?1) ORDER BY name")?;
        let indexes = idx
            .query_map([&name], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        shapes.push(TableShape {
            name,
            columns,
            foreign_keys,
            indexes,
        });
    }
    Ok(shapes)
}
