//! Deferred rename queue
//!
//! Renames coming from an editing session are buffered instead of written
//! immediately. The `Store` drains the queue as the first step of every
//! mutation, so a rename always lands before the write that depends on it.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::storage::SqliteStore;
use crate::Result;

/// What a rename applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameKind {
    /// Reflection (activity) names
    Activity,
    /// Tag names
    Tag,
}

impl RenameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenameKind::Activity => "activity",
            RenameKind::Tag => "tag",
        }
    }
}

/// One pending rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub kind: RenameKind,
    pub from: String,
    pub to: String,
}

impl Rename {
    pub fn activity(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: RenameKind::Activity,
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn tag(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: RenameKind::Tag,
            from: from.into(),
            to: to.into(),
        }
    }
}

impl std::fmt::Display for Rename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?} -> {:?}", self.kind.as_str(), self.from, self.to)
    }
}

/// Where drained renames are written
pub trait RenameTarget {
    /// Apply one rename, returning the number of rows touched
    fn apply_rename(&self, rename: &Rename) -> Result<usize>;
}

impl RenameTarget for SqliteStore {
    fn apply_rename(&self, rename: &Rename) -> Result<usize> {
        match rename.kind {
            RenameKind::Activity => self.rename_reflections(&rename.from, &rename.to),
            RenameKind::Tag => self.rename_tags(&rename.from, &rename.to),
        }
    }
}

/// FIFO of pending renames, shared between callers and the store worker.
///
/// Entries live in memory only; anything not drained before exit is lost.
#[derive(Debug, Default)]
pub struct RenameQueue {
    entries: Mutex<VecDeque<Rename>>,
}

impl RenameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rename. No I/O.
    pub fn enqueue(&self, rename: Rename) {
        tracing::debug!("Queued rename {}", rename);
        self.entries.lock().push_back(rename);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the queued entries in submission order
    pub fn pending(&self) -> Vec<Rename> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Apply queued renames in submission order.
    ///
    /// Each entry is popped before it is applied. On the first failure the
    /// error is returned: earlier entries stay applied, the failing entry is
    /// gone, and later entries remain queued for the next drain.
    pub fn drain<T: RenameTarget + ?Sized>(&self, target: &T) -> Result<usize> {
        let mut applied = 0;
        loop {
            // lock held for the pop only, not across storage I/O
            let Some(rename) = self.entries.lock().pop_front() else {
                break;
            };
            if let Err(e) = target.apply_rename(&rename) {
                tracing::warn!("Rename {} failed: {}", rename, e);
                return Err(e);
            }
            applied += 1;
        }
        if applied > 0 {
            tracing::debug!("Drained {} rename(s)", applied);
        }
        Ok(applied)
    }
}
