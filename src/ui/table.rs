use tabled::{settings::Style, Table, Tabled};

use crate::reflection::{Axis, Reflection};
use crate::report::Averaged;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

#[derive(Tabled)]
struct ReflectionRow {
    #[tabled(rename = "#")]
    id: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Activity")]
    name: String,
    #[tabled(rename = "Flow")]
    flow: &'static str,
    #[tabled(rename = "Engagement")]
    engagement: i32,
    #[tabled(rename = "Energy")]
    energy: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Note")]
    note: String,
}

/// Reflections as a table; `date` renders the epoch timestamp
pub fn reflection_table(reflections: &[Reflection], date: impl Fn(i64) -> String) -> String {
    let rows: Vec<ReflectionRow> = reflections
        .iter()
        .map(|r| ReflectionRow {
            id: r.id.map(|id| id.to_string()).unwrap_or_default(),
            date: date(r.date),
            name: r.name.clone(),
            flow: if r.is_flow_state { "yes" } else { "" },
            engagement: r.engagement,
            energy: format!("{:+}", r.energy),
            tags: r.tags.iter().cloned().collect::<Vec<_>>().join(", "),
            note: r.note.lines().next().unwrap_or_default().to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct AxisRow {
    #[tabled(rename = "#")]
    id: i64,
    #[tabled(rename = "Axis")]
    name: String,
    #[tabled(rename = "Visible")]
    visible: &'static str,
    #[tabled(rename = "Active")]
    active: &'static str,
}

pub fn axis_table(axes: &[Axis], active: Option<&str>) -> String {
    let rows: Vec<AxisRow> = axes
        .iter()
        .map(|a| AxisRow {
            id: a.id,
            name: a.name.clone(),
            visible: if a.is_visible() { "yes" } else { "no" },
            active: if Some(a.name.as_str()) == active { "*" } else { "" },
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct AveragedRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "Engagement")]
    engagement: i32,
    #[tabled(rename = "Energy")]
    energy: String,
    #[tabled(rename = "Flow")]
    flow: String,
}

pub fn averaged_table(buckets: &[Averaged]) -> String {
    let rows: Vec<AveragedRow> = buckets
        .iter()
        .enumerate()
        .map(|(i, a)| AveragedRow {
            rank: i + 1,
            label: a.label.clone().unwrap_or_default(),
            count: a.count(),
            engagement: a.engagement,
            energy: format!("{:+}", a.energy),
            flow: format!("{}/{}", a.flow_state_yes, a.count()),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
