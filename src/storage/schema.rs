//! Database schema definitions
//!
//! The schema is the sum of its versioned steps. Each step owns an `up`
//! (v-1 -> v) and a `down` (v -> v-1) list of statements; a fresh store at
//! version N is simply steps 1..=N applied in order.

use std::collections::BTreeMap;

/// Version the rest of the crate reads and writes
pub const SCHEMA_VERSION: u32 = 4;

/// Name of the axis synthesized when axes are introduced (v3)
pub const DEFAULT_AXIS_NAME: &str = "Default";

/// One reversible schema transformation
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static [&'static str],
    pub down: &'static [&'static str],
}

/// v1: reflections only
const V1_UP: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS reflection (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    is_flow_state INTEGER NOT NULL DEFAULT 0,
    engagement INTEGER NOT NULL CHECK (engagement BETWEEN 0 AND 100),
    energy INTEGER NOT NULL CHECK (energy BETWEEN -100 AND 100),
    date INTEGER NOT NULL
)
"#];

const V1_DOWN: &[&str] = &["DROP TABLE IF EXISTS reflection"];

/// v2: notes and tags
const V2_UP: &[&str] = &[
    "ALTER TABLE reflection ADD COLUMN note TEXT NOT NULL DEFAULT ''",
    r#"
CREATE TABLE IF NOT EXISTS tag (
    reflection_id INTEGER NOT NULL REFERENCES reflection(id) ON DELETE CASCADE ON UPDATE CASCADE,
    name TEXT NOT NULL,
    PRIMARY KEY (reflection_id, name)
)
"#,
];

const V2_DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS tag",
    "ALTER TABLE reflection DROP COLUMN note",
];

/// v3: axes. Every existing reflection is moved under one synthesized axis
/// so the "every reflection has an axis" invariant holds as the step commits.
const V3_UP: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS axis (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    is_hidden INTEGER NOT NULL DEFAULT 0
)
"#,
    "INSERT OR IGNORE INTO axis (name, is_hidden) VALUES ('Default', 0)",
    r#"
CREATE TABLE reflection_next (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    is_flow_state INTEGER NOT NULL DEFAULT 0,
    engagement INTEGER NOT NULL CHECK (engagement BETWEEN 0 AND 100),
    energy INTEGER NOT NULL CHECK (energy BETWEEN -100 AND 100),
    date INTEGER NOT NULL,
    note TEXT NOT NULL DEFAULT '',
    axis_id INTEGER NOT NULL REFERENCES axis(id) ON DELETE RESTRICT
)
"#,
    r#"
INSERT INTO reflection_next (id, name, is_flow_state, engagement, energy, date, note, axis_id)
SELECT id, name, is_flow_state, engagement, energy, date, note,
       (SELECT id FROM axis WHERE name = 'Default')
FROM reflection
"#,
    // keep the id high-water mark so deleted ids are never handed out again
    "DELETE FROM sqlite_sequence WHERE name = 'reflection_next'",
    "INSERT INTO sqlite_sequence (name, seq) SELECT 'reflection_next', seq FROM sqlite_sequence WHERE name = 'reflection'",
    "DROP TABLE reflection",
    "ALTER TABLE reflection_next RENAME TO reflection",
];

const V3_DOWN: &[&str] = &[
    r#"
CREATE TABLE reflection_prev (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    is_flow_state INTEGER NOT NULL DEFAULT 0,
    engagement INTEGER NOT NULL CHECK (engagement BETWEEN 0 AND 100),
    energy INTEGER NOT NULL CHECK (energy BETWEEN -100 AND 100),
    date INTEGER NOT NULL,
    note TEXT NOT NULL DEFAULT ''
)
"#,
    r#"
INSERT INTO reflection_prev (id, name, is_flow_state, engagement, energy, date, note)
SELECT id, name, is_flow_state, engagement, energy, date, note FROM reflection
"#,
    "DELETE FROM sqlite_sequence WHERE name = 'reflection_prev'",
    "INSERT INTO sqlite_sequence (name, seq) SELECT 'reflection_prev', seq FROM sqlite_sequence WHERE name = 'reflection'",
    "DROP TABLE reflection",
    "ALTER TABLE reflection_prev RENAME TO reflection",
    "DROP TABLE IF EXISTS axis",
];

/// v4: indexes for the hot read paths (per-axis listing, tag lookup)
const V4_UP: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_reflection_axis_date ON reflection(axis_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_tag_name ON tag(name)",
];

const V4_DOWN: &[&str] = &[
    "DROP INDEX IF EXISTS idx_tag_name",
    "DROP INDEX IF EXISTS idx_reflection_axis_date",
];

/// All steps keyed by the version they produce
pub fn steps() -> BTreeMap<u32, Step> {
    [
        Step { version: 1, description: "create reflection table", up: V1_UP, down: V1_DOWN },
        Step { version: 2, description: "add notes and tags", up: V2_UP, down: V2_DOWN },
        Step { version: 3, description: "introduce axes", up: V3_UP, down: V3_DOWN },
        Step { version: 4, description: "index axis listings and tags", up: V4_UP, down: V4_DOWN },
    ]
    .into_iter()
    .map(|step| (step.version, step))
    .collect()
}
