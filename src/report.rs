//! Aggregate reports over reflections
//!
//! Reports are pure functions over a slice of reflections (usually the
//! reflections of the published snapshot):
//! - `Averaged`: mean engagement/energy and flow-state tally of a set
//! - `Filter`: the closed set of predicates a report can narrow by
//! - `Category`: what a multi-bucket report groups by
//! - `Metric` + `Direction`: "best of" / "worst of" orderings

use crate::reflection::Reflection;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Aggregate of a non-empty set of reflections.
///
/// `make` returns `None` for an empty input, so a zero-valued `Averaged`
/// always describes real data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Averaged {
    /// Grouping key (activity or tag name) for bucketed reports
    pub label: Option<String>,
    /// Ids of the contributing reflections
    pub ids: Vec<i64>,
    pub flow_state_yes: usize,
    pub flow_state_no: usize,
    /// Mean engagement, truncated toward zero
    pub engagement: i32,
    /// Mean energy, truncated toward zero
    pub energy: i32,
}

impl Averaged {
    /// Aggregate `reflections`, or `None` when there are none
    pub fn make<'a, I>(reflections: I, label: Option<String>) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Reflection>,
    {
        let mut count: i64 = 0;
        let mut engagement: i64 = 0;
        let mut energy: i64 = 0;
        let mut ids = Vec::new();
        let mut flow_state_yes = 0;

        for r in reflections {
            count += 1;
            engagement += i64::from(r.engagement);
            energy += i64::from(r.energy);
            if r.is_flow_state {
                flow_state_yes += 1;
            }
            ids.extend(r.id);
        }

        if count == 0 {
            return None;
        }

        Some(Self {
            label,
            ids,
            flow_state_yes,
            flow_state_no: count as usize - flow_state_yes,
            // truncates toward zero, negative energy included
            engagement: (engagement / count) as i32,
            energy: (energy / count) as i32,
        })
    }

    /// Number of contributing reflections
    pub fn count(&self) -> usize {
        self.flow_state_yes + self.flow_state_no
    }
}

/// Anything with engagement and energy can be ranked
pub trait Scored {
    fn engagement(&self) -> i32;
    fn energy(&self) -> i32;
}

impl Scored for Reflection {
    fn engagement(&self) -> i32 {
        self.engagement
    }

    fn energy(&self) -> i32 {
        self.energy
    }
}

impl Scored for Averaged {
    fn engagement(&self) -> i32 {
        self.engagement
    }

    fn energy(&self) -> i32 {
        self.energy
    }
}

/// What a ranking compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Engagement,
    Energy,
    /// engagement + energy
    Combined,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Engagement => "engagement",
            Metric::Energy => "energy",
            Metric::Combined => "combined",
        }
    }

    /// The compared value
    pub fn value<S: Scored>(&self, item: &S) -> i32 {
        match self {
            Metric::Engagement => item.engagement(),
            Metric::Energy => item.energy(),
            Metric::Combined => item.engagement() + item.energy(),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "engagement" | "e" => Ok(Metric::Engagement),
            "energy" | "n" => Ok(Metric::Energy),
            "combined" | "both" | "sum" => Ok(Metric::Combined),
            _ => Err(format!("Unknown metric: {}", s)),
        }
    }
}

/// Best-of or worst-of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Best,
    Worst,
}

impl Direction {
    /// Comparator for a stable sort. `Worst` is `Best` inverted, so ties
    /// keep their input order in both directions.
    pub fn comparator<S: Scored>(self, metric: Metric) -> impl Fn(&S, &S) -> Ordering {
        move |a, b| {
            let best_first = metric.value(b).cmp(&metric.value(a));
            match self {
                Direction::Best => best_first,
                Direction::Worst => best_first.reverse(),
            }
        }
    }
}

/// What a bucketed report groups by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Activity,
    Tag,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Activity => "activity",
            Category::Tag => "tag",
        }
    }

    /// Bucket keys a reflection contributes to. A reflection with several
    /// tags counts toward each of them.
    pub fn keys<'a>(&self, reflection: &'a Reflection) -> Vec<&'a str> {
        match self {
            Category::Activity => vec![reflection.name.as_str()],
            Category::Tag => reflection.tags.iter().map(String::as_str).collect(),
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "activity" | "activities" | "name" => Ok(Category::Activity),
            "tag" | "tags" => Ok(Category::Tag),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Closed set of report predicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    All,
    Activity(String),
    Tag(String),
    FlowState(bool),
    /// Reflections dated at or after this epoch second
    Since(i64),
}

impl Filter {
    pub fn matches(&self, reflection: &Reflection) -> bool {
        match self {
            Filter::All => true,
            Filter::Activity(name) => reflection.name == *name,
            Filter::Tag(name) => reflection.tags.contains(name),
            Filter::FlowState(flow) => reflection.is_flow_state == *flow,
            Filter::Since(ts) => reflection.date >= *ts,
        }
    }

    /// Aggregate the matching reflections
    pub fn average(&self, reflections: &[Reflection], label: Option<String>) -> Option<Averaged> {
        Averaged::make(reflections.iter().filter(|r| self.matches(r)), label)
    }
}

/// One labelled aggregate per distinct key, sorted by label
pub fn group_by(reflections: &[Reflection], category: Category) -> Vec<Averaged> {
    let mut buckets: BTreeMap<&str, Vec<&Reflection>> = BTreeMap::new();
    for reflection in reflections {
        for key in category.keys(reflection) {
            buckets.entry(key).or_default().push(reflection);
        }
    }

    buckets
        .into_iter()
        .filter_map(|(key, members)| Averaged::make(members, Some(key.to_string())))
        .collect()
}

/// Stable sort by metric in the given direction
pub fn rank<S: Scored>(items: &mut [S], metric: Metric, direction: Direction) {
    items.sort_by(direction.comparator(metric));
}

/// Group, then rank the buckets
pub fn ranked(
    reflections: &[Reflection],
    category: Category,
    metric: Metric,
    direction: Direction,
) -> Vec<Averaged> {
    let mut buckets = group_by(reflections, category);
    rank(&mut buckets, metric, direction);
    buckets
}
