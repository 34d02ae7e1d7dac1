//! Reflection and axis types
//!
//! A reflection is one logged observation: what you were doing, whether you
//! were in flow, and how engaged and energized it left you. Every reflection
//! lives under exactly one axis (a named "view" that can be hidden from
//! default listings without being deleted).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Allowed range for `Reflection::engagement`
pub const ENGAGEMENT_RANGE: RangeInclusive<i32> = 0..=100;

/// Allowed range for `Reflection::energy`
pub const ENERGY_RANGE: RangeInclusive<i32> = -100..=100;

/// A single logged observation.
///
/// `id` is `None` until the store assigns one on insert. The axis is carried
/// by name; the storage layer resolves (or creates) the axis row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    /// Store-assigned identity, immutable once set
    pub id: Option<i64>,
    /// Activity label
    pub name: String,
    /// Whether the activity put you in a flow state
    pub is_flow_state: bool,
    /// Engagement, 0..=100
    pub engagement: i32,
    /// Energy gained or drained, -100..=100
    pub energy: i32,
    /// Seconds since the Unix epoch
    pub date: i64,
    /// Free-text note
    pub note: String,
    /// Name of the owning axis
    pub axis: String,
    /// Tag names, unordered and unique
    pub tags: BTreeSet<String>,
}

impl Reflection {
    /// Create a new, not yet persisted reflection
    pub fn new(
        name: impl Into<String>,
        axis: impl Into<String>,
        engagement: i32,
        energy: i32,
        date: i64,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            is_flow_state: false,
            engagement,
            energy,
            date,
            note: String::new(),
            axis: axis.into(),
            tags: BTreeSet::new(),
        }
    }

    /// Mark the reflection as a flow state (or not)
    pub fn with_flow_state(mut self, is_flow_state: bool) -> Self {
        self.is_flow_state = is_flow_state;
        self
    }

    /// Set the note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Add tags, ignoring duplicates
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Attach a store-assigned id
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Check the field bounds before anything reaches storage
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidReflection("name must not be empty".to_string()));
        }
        if self.axis.trim().is_empty() {
            return Err(Error::InvalidReflection("axis must not be empty".to_string()));
        }
        if !ENGAGEMENT_RANGE.contains(&self.engagement) {
            return Err(Error::InvalidReflection(format!(
                "engagement {} outside {:?}",
                self.engagement, ENGAGEMENT_RANGE
            )));
        }
        if !ENERGY_RANGE.contains(&self.energy) {
            return Err(Error::InvalidReflection(format!(
                "energy {} outside {:?}",
                self.energy, ENERGY_RANGE
            )));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidReflection("tags must not be empty".to_string()));
        }
        Ok(())
    }

    /// Same record ignoring the store-assigned id
    pub fn same_content(&self, other: &Reflection) -> bool {
        Reflection { id: None, ..self.clone() } == Reflection { id: None, ..other.clone() }
    }
}

/// A named partition of reflections
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Axis {
    pub id: i64,
    pub name: String,
    pub is_hidden: bool,
}

impl Axis {
    pub fn is_visible(&self) -> bool {
        !self.is_hidden
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_hidden {
            write!(f, "{} (hidden)", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}
