use serde::Serialize;

use crate::reflection::{Axis, Reflection};
use crate::report::{self, Averaged, Category, Direction, Filter, Metric};
use crate::storage::SqliteStore;
use crate::{Error, Result};

/// Everything presentation code reads, computed by one complete pass over
/// storage and published as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// The active axis; `None` only when no axis exists
    pub axis: Option<Axis>,
    /// Reflections of the active axis, newest first
    pub reflections: Vec<Reflection>,
    /// Distinct activity names of the active axis
    pub activity_names: Vec<String>,
    /// Distinct tag names across all axes
    pub tag_names: Vec<String>,
    /// Distinct tag names of the active axis
    pub axis_tag_names: Vec<String>,
    pub visible_axes: Vec<Axis>,
    pub hidden_axes: Vec<Axis>,
    /// Publication counter; 0 means nothing has been published yet
    pub generation: u64,
}

impl Snapshot {
    /// Read a full snapshot. `requested` must exist if given; otherwise
    /// `current` is used when it still exists, then the first visible axis,
    /// then the first axis.
    pub(crate) fn read(
        storage: &SqliteStore,
        requested: Option<&str>,
        current: Option<&str>,
    ) -> Result<Self> {
        let axes = storage.fetch_axes()?;
        let find = |name: &str| axes.iter().find(|a| a.name == name).cloned();

        let axis = match requested {
            Some(name) => Some(find(name).ok_or_else(|| Error::AxisNotFound(name.to_string()))?),
            None => current
                .and_then(find)
                .or_else(|| axes.iter().find(|a| a.is_visible()).cloned())
                .or_else(|| axes.first().cloned()),
        };

        let axis_id = axis.as_ref().map(|a| a.id);
        let (reflections, activity_names, axis_tag_names) = match axis_id {
            Some(id) => (
                storage.fetch_reflections(Some(id))?,
                storage.activity_names(Some(id))?,
                storage.tag_names(Some(id))?,
            ),
            None => (Vec::new(), Vec::new(), Vec::new()),
        };
        let (visible_axes, hidden_axes): (Vec<Axis>, Vec<Axis>) =
            axes.into_iter().partition(Axis::is_visible);

        Ok(Self {
            axis,
            reflections,
            activity_names,
            tag_names: storage.tag_names(None)?,
            axis_tag_names,
            visible_axes,
            hidden_axes,
            generation: 0,
        })
    }

    pub fn axis_name(&self) -> Option<&str> {
        self.axis.as_ref().map(|a| a.name.as_str())
    }

    /// Aggregate of the active axis' reflections matching `filter`
    pub fn average(&self, filter: &Filter) -> Option<Averaged> {
        filter.average(&self.reflections, None)
    }

    /// Best/worst buckets of the active axis
    pub fn ranked(&self, category: Category, metric: Metric, direction: Direction) -> Vec<Averaged> {
        report::ranked(&self.reflections, category, metric, direction)
    }
}
