//! SQLite storage implementation

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use super::migrations::{self, MigrationReport};
use super::schema::SCHEMA_VERSION;
use crate::reflection::{Axis, Reflection};
use crate::{Error, MigrationOrigin, Result};

const REFLECTION_COLUMNS: &str =
    "r.id, r.name, r.is_flow_state, r.engagement, r.energy, r.date, r.note, a.name";

/// SQLite-backed storage for reflections, axes and tags
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open a database file at the current schema version (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_at(path, SCHEMA_VERSION).map(|(store, _)| store)
    }

    /// Open a database file and migrate it to `target`
    pub fn open_at(path: &Path, target: u32) -> Result<(Self, MigrationReport)> {
        let (conn, report) = migrations::open(path, target)?;
        tracing::debug!("Opened {} at schema v{}", path.display(), target);
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        Ok((store, report))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let (conn, _) = migrations::open_in_memory(SCHEMA_VERSION)?;
        Ok(Self { conn, path: None })
    }

    /// Location of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persisted schema version
    pub fn schema_version(&self) -> Result<u32> {
        migrations::current_version(&self.conn)
    }

    /// Walk the open store to `target`, backing up the file first
    pub fn migrate(&mut self, target: u32) -> Result<MigrationReport> {
        let backup = self.path.clone();
        migrations::migrate(&mut self.conn, target, backup.as_deref(), MigrationOrigin::Migrate)
    }

    /// Raw connection, for schema inspection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ========== Transactions ==========

    /// Run `f` inside a savepoint; roll back everything it did if it fails.
    ///
    /// Savepoints nest, so storage operations that use this internally can be
    /// grouped by a caller into one larger unit (e.g. an import).
    pub fn atomically<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.conn.execute_batch("SAVEPOINT flowlog")?;
        match f() {
            Ok(value) => {
                self.conn.execute_batch("RELEASE flowlog")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK TO flowlog; RELEASE flowlog") {
                    tracing::error!("Rollback failed: {}", rollback);
                }
                Err(err)
            }
        }
    }

    // ========== Reflection Operations ==========

    /// Insert a reflection, creating its axis if needed. Returns the new id.
    pub fn insert_reflection(&self, reflection: &Reflection) -> Result<i64> {
        reflection.validate()?;
        self.atomically(|| {
            let axis = self.fetch_or_create_axis(&reflection.axis)?;
            self.conn.execute(
                r#"
                INSERT INTO reflection (name, is_flow_state, engagement, energy, date, note, axis_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    reflection.name,
                    reflection.is_flow_state,
                    reflection.engagement,
                    reflection.energy,
                    reflection.date,
                    reflection.note,
                    axis.id,
                ],
            )?;
            let id = self.conn.last_insert_rowid();
            self.insert_tags(id, &reflection.tags)?;
            tracing::debug!("Inserted reflection {} ({})", id, reflection.name);
            Ok(id)
        })
    }

    /// Overwrite every field of an existing reflection and reconcile its tags
    pub fn update_reflection(&self, reflection: &Reflection) -> Result<()> {
        let id = reflection
            .id
            .ok_or_else(|| Error::InvalidReflection("update requires an id".to_string()))?;
        reflection.validate()?;
        self.atomically(|| {
            let axis = self.fetch_or_create_axis(&reflection.axis)?;
            let changed = self.conn.execute(
                r#"
                UPDATE reflection
                SET name = ?1, is_flow_state = ?2, engagement = ?3, energy = ?4, date = ?5, note = ?6, axis_id = ?7
                WHERE id = ?8
                "#,
                params![
                    reflection.name,
                    reflection.is_flow_state,
                    reflection.engagement,
                    reflection.energy,
                    reflection.date,
                    reflection.note,
                    axis.id,
                    id,
                ],
            )?;
            if changed == 0 {
                return Err(Error::ReflectionNotFound(id));
            }

            let existing = self.fetch_tags(id)?;
            let stale: BTreeSet<String> = existing.difference(&reflection.tags).cloned().collect();
            let missing: BTreeSet<String> = reflection.tags.difference(&existing).cloned().collect();
            self.delete_tags(id, &stale)?;
            self.insert_tags(id, &missing)?;
            tracing::debug!("Updated reflection {} (+{} -{} tags)", id, missing.len(), stale.len());
            Ok(())
        })
    }

    /// Delete reflections by id. Empty lists and unknown ids are no-ops.
    pub fn delete_reflections(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.atomically(|| {
            let mut stmt = self.conn.prepare("DELETE FROM reflection WHERE id = ?1")?;
            let mut deleted = 0;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
            tracing::debug!("Deleted {} of {} reflection(s)", deleted, ids.len());
            Ok(deleted)
        })
    }

    /// Get a reflection by id
    pub fn fetch_reflection(&self, id: i64) -> Result<Option<Reflection>> {
        let sql = format!(
            "SELECT {} FROM reflection r JOIN axis a ON a.id = r.axis_id WHERE r.id = ?1",
            REFLECTION_COLUMNS
        );
        let reflection = self
            .conn
            .query_row(&sql, [id], |row| self.row_to_reflection(row))
            .optional()?;

        match reflection {
            Some(mut r) => {
                r.tags = self.fetch_tags(id)?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    /// All reflections, or those of one axis, newest first
    pub fn fetch_reflections(&self, axis_id: Option<i64>) -> Result<Vec<Reflection>> {
        let filter = if axis_id.is_some() { "WHERE r.axis_id = ?1" } else { "" };
        let sql = format!(
            "SELECT {} FROM reflection r JOIN axis a ON a.id = r.axis_id {} ORDER BY r.date DESC, r.id DESC",
            REFLECTION_COLUMNS, filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut reflections: Vec<Reflection> = match axis_id {
            Some(id) => stmt
                .query_map([id], |row| self.row_to_reflection(row))?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map([], |row| self.row_to_reflection(row))?
                .collect::<rusqlite::Result<_>>()?,
        };

        let mut tags = self.tags_by_reflection(axis_id)?;
        for reflection in &mut reflections {
            if let Some(set) = reflection.id.and_then(|id| tags.remove(&id)) {
                reflection.tags = set;
            }
        }
        Ok(reflections)
    }

    /// Count all reflections
    pub fn count_reflections(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM reflection", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Distinct activity names, optionally limited to one axis
    pub fn activity_names(&self, axis_id: Option<i64>) -> Result<Vec<String>> {
        match axis_id {
            Some(id) => self.strings(
                "SELECT DISTINCT name FROM reflection WHERE axis_id = ?1 ORDER BY name",
                Some(id),
            ),
            None => self.strings("SELECT DISTINCT name FROM reflection ORDER BY name", None),
        }
    }

    /// Rename every reflection called `from`. Returns the number renamed.
    pub fn rename_reflections(&self, from: &str, to: &str) -> Result<usize> {
        require_name("activity name", to)?;
        let renamed = self
            .conn
            .execute("UPDATE reflection SET name = ?2 WHERE name = ?1", params![from, to])?;
        tracing::debug!("Renamed {} reflection(s) {:?} -> {:?}", renamed, from, to);
        Ok(renamed)
    }

    /// Helper to convert a row to a Reflection (tags are loaded separately)
    fn row_to_reflection(&self, row: &rusqlite::Row) -> rusqlite::Result<Reflection> {
        Ok(Reflection {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            is_flow_state: row.get(2)?,
            engagement: row.get(3)?,
            energy: row.get(4)?,
            date: row.get(5)?,
            note: row.get(6)?,
            axis: row.get(7)?,
            tags: BTreeSet::new(),
        })
    }

    // ========== Axis Operations ==========

    /// Insert a new axis
    pub fn insert_axis(&self, name: &str, is_hidden: bool) -> Result<Axis> {
        require_name("axis name", name)?;
        self.conn.execute(
            "INSERT INTO axis (name, is_hidden) VALUES (?1, ?2)",
            params![name, is_hidden],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!("Inserted axis {} ({})", id, name);
        Ok(Axis {
            id,
            name: name.to_string(),
            is_hidden,
        })
    }

    /// Get the named axis, creating a visible one if it does not exist
    pub fn fetch_or_create_axis(&self, name: &str) -> Result<Axis> {
        match self.fetch_axis_by_name(name)? {
            Some(axis) => Ok(axis),
            None => self.insert_axis(name, false),
        }
    }

    /// Get an axis by id
    pub fn fetch_axis(&self, id: i64) -> Result<Option<Axis>> {
        self.conn
            .query_row(
                "SELECT id, name, is_hidden FROM axis WHERE id = ?1",
                [id],
                |row| self.row_to_axis(row),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get an axis by name
    pub fn fetch_axis_by_name(&self, name: &str) -> Result<Option<Axis>> {
        self.conn
            .query_row(
                "SELECT id, name, is_hidden FROM axis WHERE name = ?1",
                [name],
                |row| self.row_to_axis(row),
            )
            .optional()
            .map_err(Into::into)
    }

    /// All axes in creation order
    pub fn fetch_axes(&self) -> Result<Vec<Axis>> {
        let mut stmt = self.conn.prepare("SELECT id, name, is_hidden FROM axis ORDER BY id")?;
        let axes = stmt
            .query_map([], |row| self.row_to_axis(row))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(axes)
    }

    /// Rename and/or hide an axis by id
    pub fn update_axis(&self, axis: &Axis) -> Result<()> {
        require_name("axis name", &axis.name)?;
        let changed = self.conn.execute(
            "UPDATE axis SET name = ?1, is_hidden = ?2 WHERE id = ?3",
            params![axis.name, axis.is_hidden, axis.id],
        )?;
        if changed == 0 {
            return Err(Error::AxisNotFound(axis.id.to_string()));
        }
        Ok(())
    }

    /// Delete an axis. Fails with a constraint violation while it still has reflections.
    pub fn delete_axis(&self, id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM axis WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Delete axes by name, all or nothing
    pub fn delete_axes_by_name(&self, names: &[String]) -> Result<usize> {
        if names.is_empty() {
            return Ok(0);
        }
        self.atomically(|| {
            let mut stmt = self.conn.prepare("DELETE FROM axis WHERE name = ?1")?;
            let mut deleted = 0;
            for name in names {
                deleted += stmt.execute([name])?;
            }
            Ok(deleted)
        })
    }

    /// Move every reflection of `from` into `into`, then delete `from`
    pub fn merge_axis(&self, from: i64, into: i64) -> Result<usize> {
        if from == into {
            return Ok(0);
        }
        self.atomically(|| {
            if self.fetch_axis(into)?.is_none() {
                return Err(Error::AxisNotFound(into.to_string()));
            }
            let moved = self.conn.execute(
                "UPDATE reflection SET axis_id = ?2 WHERE axis_id = ?1",
                params![from, into],
            )?;
            if !self.delete_axis(from)? {
                return Err(Error::AxisNotFound(from.to_string()));
            }
            tracing::debug!("Merged axis {} into {} ({} reflection(s))", from, into, moved);
            Ok(moved)
        })
    }

    fn row_to_axis(&self, row: &rusqlite::Row) -> rusqlite::Result<Axis> {
        Ok(Axis {
            id: row.get(0)?,
            name: row.get(1)?,
            is_hidden: row.get(2)?,
        })
    }

    // ========== Tag Operations ==========

    /// Tag names attached to one reflection
    pub fn fetch_tags(&self, reflection_id: i64) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM tag WHERE reflection_id = ?1")?;
        let tags = stmt
            .query_map([reflection_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(tags)
    }

    /// Attach tags, ignoring ones already present
    pub fn insert_tags<'a, I>(&self, reflection_id: i64, names: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut stmt = self
            .conn
            .prepare("INSERT OR IGNORE INTO tag (reflection_id, name) VALUES (?1, ?2)")?;
        for name in names {
            stmt.execute(params![reflection_id, name])?;
        }
        Ok(())
    }

    /// Detach tags
    pub fn delete_tags<'a, I>(&self, reflection_id: i64, names: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut stmt = self
            .conn
            .prepare("DELETE FROM tag WHERE reflection_id = ?1 AND name = ?2")?;
        for name in names {
            stmt.execute(params![reflection_id, name])?;
        }
        Ok(())
    }

    /// Distinct tag names, optionally limited to one axis
    pub fn tag_names(&self, axis_id: Option<i64>) -> Result<Vec<String>> {
        match axis_id {
            Some(id) => self.strings(
                "SELECT DISTINCT t.name FROM tag t JOIN reflection r ON r.id = t.reflection_id WHERE r.axis_id = ?1 ORDER BY t.name",
                Some(id),
            ),
            None => self.strings("SELECT DISTINCT name FROM tag ORDER BY name", None),
        }
    }

    /// Rename a tag everywhere. A reflection that already carries `to`
    /// keeps a single row.
    pub fn rename_tags(&self, from: &str, to: &str) -> Result<usize> {
        require_name("tag name", to)?;
        if from == to {
            return Ok(0);
        }
        self.atomically(|| {
            let renamed = self
                .conn
                .execute("UPDATE OR IGNORE tag SET name = ?2 WHERE name = ?1", params![from, to])?;
            // rows left behind belong to reflections that already carried `to`
            let merged = self.conn.execute(
                "DELETE FROM tag WHERE name = ?1 AND reflection_id IN (SELECT reflection_id FROM tag WHERE name = ?2)",
                params![from, to],
            )?;
            tracing::debug!("Renamed tag {:?} -> {:?} ({} moved, {} merged)", from, to, renamed, merged);
            Ok(renamed + merged)
        })
    }

    fn tags_by_reflection(&self, axis_id: Option<i64>) -> Result<HashMap<i64, BTreeSet<String>>> {
        let (sql, args): (&str, Vec<i64>) = match axis_id {
            Some(id) => (
                "SELECT t.reflection_id, t.name FROM tag t JOIN reflection r ON r.id = t.reflection_id WHERE r.axis_id = ?1",
                vec![id],
            ),
            None => ("SELECT reflection_id, name FROM tag", vec![]),
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut map: HashMap<i64, BTreeSet<String>> = HashMap::new();
        for row in rows {
            let (id, name) = row?;
            map.entry(id).or_default().insert(name);
        }
        Ok(map)
    }

    fn strings(&self, sql: &str, arg: Option<i64>) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let values = stmt
            .query_map(params_from_iter(arg), |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(values)
    }

    // ========== Bulk Operations ==========

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let axes: i64 = self.conn.query_row("SELECT COUNT(*) FROM axis", [], |row| row.get(0))?;
        let tags: i64 = self.conn.query_row("SELECT COUNT(*) FROM tag", [], |row| row.get(0))?;
        Ok(DbStats {
            schema_version: self.schema_version()?,
            reflections: self.count_reflections()?,
            axes: axes as usize,
            tags: tags as usize,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub schema_version: u32,
    pub reflections: usize,
    pub axes: usize,
    pub tags: usize,
}

/// Reject empty or whitespace-only names
fn require_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidReflection(format!("{} must not be empty", what)));
    }
    Ok(())
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "v{}, {} reflection(s), {} axis/axes, {} tag(s)",
            self.schema_version, self.reflections, self.axes, self.tags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, axis: &str, date: i64) -> Reflection {
        Reflection::new(name, axis, 60, 20, date)
    }

    #[test]
    fn test_ids_assigned_in_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ids: Vec<i64> = (0..5)
            .map(|i| store.insert_reflection(&sample("Write", "Work", i)).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_reflection(&sample("a", "Work", 1)).unwrap();
        let second = store.insert_reflection(&sample("b", "Work", 2)).unwrap();
        store.delete_reflections(&[second]).unwrap();
        let third = store.insert_reflection(&sample("c", "Work", 3)).unwrap();
        assert_eq!(third, 3);
    }

    #[test]
    fn test_reflection_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let reflection = sample("Climb", "Health", 100)
            .with_flow_state(true)
            .with_note("bouldering")
            .with_tags(["outdoor", "friends"]);

        let id = store.insert_reflection(&reflection).unwrap();
        let fetched = store.fetch_reflection(id).unwrap().unwrap();
        assert_eq!(fetched, reflection.clone().with_id(id));
    }

    #[test]
    fn test_insert_creates_axis_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_reflection(&sample("a", "Work", 1)).unwrap();
        store.insert_reflection(&sample("b", "Work", 2)).unwrap();
        let names: Vec<String> = store.fetch_axes().unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Default", "Work"]);
    }

    #[test]
    fn test_update_overwrites_fields_and_reconciles_tags() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert_reflection(&sample("Draft", "Work", 1).with_tags(["a", "b"]))
            .unwrap();

        let updated = Reflection::new("Edit", "Side", 10, -40, 99)
            .with_note("tired")
            .with_tags(["b", "c"])
            .with_id(id);
        store.update_reflection(&updated).unwrap();

        let fetched = store.fetch_reflection(id).unwrap().unwrap();
        assert_eq!(fetched, updated);
        assert_eq!(store.fetch_tags(id).unwrap().into_iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_update_missing_id_fails() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.update_reflection(&sample("x", "Work", 1).with_id(77)).unwrap_err();
        assert!(matches!(err, Error::ReflectionNotFound(77)));
        // The axis created inside the failed update was rolled back
        assert!(store.fetch_axis_by_name("Work").unwrap().is_none());
    }

    #[test]
    fn test_invalid_reflection_never_reaches_storage() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.insert_reflection(&Reflection::new("x", "Work", 150, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidReflection(_)));
        assert_eq!(store.count_reflections().unwrap(), 0);
    }

    #[test]
    fn test_delete_is_noop_for_missing_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let keep = store.insert_reflection(&sample("keep", "Work", 1)).unwrap();
        let gone = store.insert_reflection(&sample("gone", "Work", 2)).unwrap();

        assert_eq!(store.delete_reflections(&[]).unwrap(), 0);
        assert_eq!(store.delete_reflections(&[gone]).unwrap(), 1);
        assert_eq!(store.delete_reflections(&[gone, 999]).unwrap(), 0);

        let remaining: Vec<i64> = store
            .fetch_reflections(None)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        assert_eq!(remaining, vec![keep]);
    }

    #[test]
    fn test_delete_cascades_tags() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_reflection(&sample("x", "Work", 1).with_tags(["t"])).unwrap();
        store.delete_reflections(&[id]).unwrap();
        assert!(store.tag_names(None).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_newest_first_and_by_axis() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_reflection(&sample("old", "Work", 10)).unwrap();
        store.insert_reflection(&sample("new", "Work", 30)).unwrap();
        store.insert_reflection(&sample("mid", "Home", 20)).unwrap();

        let all: Vec<String> = store.fetch_reflections(None).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(all, vec!["new", "mid", "old"]);

        let work = store.fetch_axis_by_name("Work").unwrap().unwrap();
        let names: Vec<String> = store
            .fetch_reflections(Some(work.id))
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[test]
    fn test_axis_with_reflections_cannot_be_deleted() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_reflection(&sample("x", "Work", 1)).unwrap();
        let work = store.fetch_axis_by_name("Work").unwrap().unwrap();

        let err = store.delete_axis(work.id).unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(store.fetch_axis(work.id).unwrap().is_some());
    }

    #[test]
    fn test_duplicate_axis_name_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_axis("Work", false).unwrap();
        let err = store.insert_axis("Work", true).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_delete_axes_by_name_is_all_or_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_axis("Empty", false).unwrap();
        store.insert_reflection(&sample("x", "Busy", 1)).unwrap();

        assert!(store.delete_axes_by_name(&["Empty".into(), "Busy".into()]).is_err());
        assert!(store.fetch_axis_by_name("Empty").unwrap().is_some());

        assert_eq!(store.delete_axes_by_name(&["Empty".into()]).unwrap(), 1);
    }

    #[test]
    fn test_merge_moves_reflections_and_deletes_source() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_reflection(&sample("a", "Old", 1)).unwrap();
        store.insert_reflection(&sample("b", "Old", 2)).unwrap();
        let old = store.fetch_axis_by_name("Old").unwrap().unwrap();
        let new = store.insert_axis("New", false).unwrap();

        assert_eq!(store.merge_axis(old.id, new.id).unwrap(), 2);
        assert!(store.fetch_axis(old.id).unwrap().is_none());
        assert_eq!(store.fetch_reflections(Some(new.id)).unwrap().len(), 2);
    }

    #[test]
    fn test_update_axis_hides() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut axis = store.insert_axis("Work", false).unwrap();
        axis.is_hidden = true;
        axis.name = "Job".into();
        store.update_axis(&axis).unwrap();
        assert_eq!(store.fetch_axis(axis.id).unwrap(), Some(axis));
    }

    #[test]
    fn test_rename_tags_merges_duplicates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let both = store.insert_reflection(&sample("x", "Work", 1).with_tags(["run", "jog"])).unwrap();
        let one = store.insert_reflection(&sample("y", "Work", 2).with_tags(["jog"])).unwrap();

        store.rename_tags("jog", "run").unwrap();

        assert_eq!(store.fetch_tags(both).unwrap().into_iter().collect::<Vec<_>>(), vec!["run"]);
        assert_eq!(store.fetch_tags(one).unwrap().into_iter().collect::<Vec<_>>(), vec!["run"]);
        assert_eq!(store.tag_names(None).unwrap(), vec!["run"]);
    }

    #[test]
    fn test_rename_reflections_and_names() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_reflection(&sample("Jog", "Health", 1)).unwrap();
        store.insert_reflection(&sample("Jog", "Health", 2)).unwrap();
        store.insert_reflection(&sample("Swim", "Other", 3)).unwrap();

        assert_eq!(store.rename_reflections("Jog", "Run").unwrap(), 2);
        let health = store.fetch_axis_by_name("Health").unwrap().unwrap();
        assert_eq!(store.activity_names(Some(health.id)).unwrap(), vec!["Run"]);
        assert_eq!(store.activity_names(None).unwrap(), vec!["Run", "Swim"]);
    }

    #[test]
    fn test_rename_tag_to_itself_keeps_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_reflection(&sample("a", "Work", 1).with_tags(["x", "y"])).unwrap();

        assert_eq!(store.rename_tags("x", "x").unwrap(), 0);
        assert_eq!(store.fetch_tags(id).unwrap().into_iter().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_rename_tag_keeps_rows_of_reflections_without_target() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_reflection(&sample("a", "Work", 1).with_tags(["old"])).unwrap();

        assert_eq!(store.rename_tags("old", "new").unwrap(), 1);
        assert_eq!(store.fetch_tags(id).unwrap().into_iter().collect::<Vec<_>>(), vec!["new"]);
    }

    #[test]
    fn test_renames_reject_blank_names() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_reflection(&sample("Run", "Work", 1).with_tags(["x"])).unwrap();
        let work = store.fetch_axis_by_name("Work").unwrap().unwrap();

        assert!(matches!(store.rename_reflections("Run", ""), Err(Error::InvalidReflection(_))));
        assert!(matches!(store.rename_tags("x", "  "), Err(Error::InvalidReflection(_))));
        let blank = Axis { name: " ".into(), ..work.clone() };
        assert!(matches!(store.update_axis(&blank), Err(Error::InvalidReflection(_))));

        let kept = store.fetch_reflection(id).unwrap().unwrap();
        assert_eq!(kept.name, "Run");
        assert_eq!(kept.axis, "Work");
        assert!(kept.tags.contains("x"));
    }

    #[test]
    fn test_atomically_rolls_back_nested_work() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: Result<()> = store.atomically(|| {
            store.insert_reflection(&sample("a", "Work", 1))?;
            store.insert_reflection(&Reflection::new("bad", "Work", 500, 0, 2))?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(store.count_reflections().unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_reflection(&sample("a", "Work", 1).with_tags(["x", "y"])).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.schema_version, SCHEMA_VERSION);
        assert_eq!(stats.reflections, 1);
        assert_eq!(stats.axes, 2);
        assert_eq!(stats.tags, 2);
        assert_eq!(stats.to_string(), "v4, 1 reflection(s), 2 axis/axes, 2 tag(s)");
    }
}
