//! Import/export of reflections as tab-separated text
//!
//! ```text
//! {"schemaVersion":4}
//! view<TAB>name<TAB>isFlowState<TAB>engagement<TAB>energy<TAB>date<TAB>note<TAB>tags
//! Work<TAB>Writing<TAB>1<TAB>80<TAB>40<TAB>1700000000<TAB>deep focus<TAB>solo;morning
//! ```
//!
//! Backslash, tab, CR and LF inside a field are written as `\\`, `\t`, `\r`
//! and `\n`; a `;` inside a tag name is written as `\;`.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::reflection::Reflection;
use crate::storage::SqliteStore;
use crate::{Error, Result};

/// Column labels of the record layout
pub const COLUMNS: [&str; 8] = [
    "view",
    "name",
    "isFlowState",
    "engagement",
    "energy",
    "date",
    "note",
    "tags",
];

const TAG_SEPARATOR: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    schema_version: u32,
}

/// Record layouts, one per exporting schema version we can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    V4,
}

impl Layout {
    fn for_version(version: u32) -> Result<Self> {
        match version {
            4 => Ok(Layout::V4),
            other => Err(Error::UnsupportedSchema(other)),
        }
    }

    fn parse(&self, line_no: usize, line: &str) -> Result<Reflection> {
        match self {
            Layout::V4 => parse_v4(line_no, line),
        }
    }
}

/// Serialize every reflection (all axes, newest first)
pub fn export(storage: &SqliteStore) -> Result<String> {
    let mut out = Vec::new();
    export_to(storage, &mut out)?;
    String::from_utf8(out).map_err(|e| Error::Unspecified(Box::new(e)))
}

/// Stream an export into `writer`. Returns the number of records written.
pub fn export_to<W: Write>(storage: &SqliteStore, mut writer: W) -> Result<usize> {
    let header = Header {
        schema_version: storage.schema_version()?,
    };
    writeln!(writer, "{}", serde_json::to_string(&header)?)?;
    writeln!(writer, "{}", COLUMNS.join("\t"))?;

    let reflections = storage.fetch_reflections(None)?;
    for r in &reflections {
        let tags: Vec<String> = r.tags.iter().map(|t| escape_tag(t)).collect();
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            escape(&r.axis),
            escape(&r.name),
            if r.is_flow_state { 1 } else { 0 },
            r.engagement,
            r.energy,
            r.date,
            escape(&r.note),
            tags.join(";"),
        )?;
    }
    writer.flush()?;

    tracing::info!("Exported {} reflection(s)", reflections.len());
    Ok(reflections.len())
}

/// Insert every record of `source` in one transaction. Returns the number
/// imported; on any failure nothing is imported.
pub fn import(storage: &SqliteStore, source: &str) -> Result<usize> {
    let lines: Vec<&str> = source.lines().collect();
    if lines.len() < 2 {
        return Err(Error::Import(
            "expected a schema header and a column line".to_string(),
        ));
    }

    let header: Header = serde_json::from_str(lines[0].trim())
        .map_err(|e| Error::Import(format!("line 1: invalid header: {}", e)))?;
    let layout = Layout::for_version(header.schema_version)?;

    let columns: Vec<&str> = lines[1].trim_end().split('\t').collect();
    if columns != COLUMNS {
        return Err(Error::Import(format!("line 2: unexpected columns {:?}", columns)));
    }

    let imported = storage.atomically(|| {
        let mut count = 0;
        for (idx, line) in lines.iter().enumerate().skip(2) {
            if line.trim().is_empty() {
                continue;
            }
            let reflection = layout.parse(idx + 1, line)?;
            storage.insert_reflection(&reflection)?;
            count += 1;
        }
        Ok(count)
    })?;

    tracing::info!(
        "Imported {} reflection(s) from schema v{}",
        imported,
        header.schema_version
    );
    Ok(imported)
}

fn parse_v4(line_no: usize, line: &str) -> Result<Reflection> {
    let bad = |msg: String| Error::Import(format!("line {}: {}", line_no, msg));

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != COLUMNS.len() {
        return Err(bad(format!(
            "expected {} fields, found {}",
            COLUMNS.len(),
            fields.len()
        )));
    }

    let is_flow_state = match fields[2].trim() {
        "0" => false,
        "1" => true,
        other => return Err(bad(format!("isFlowState must be 0 or 1, got {:?}", other))),
    };
    let int = |idx: usize| -> Result<i64> {
        fields[idx]
            .trim()
            .parse::<i64>()
            .map_err(|_| bad(format!("{} is not an integer: {:?}", COLUMNS[idx], fields[idx])))
    };
    let metric = |idx: usize| -> Result<i32> {
        i32::try_from(int(idx)?).map_err(|_| bad(format!("{} out of range", COLUMNS[idx])))
    };

    let reflection = Reflection {
        id: None,
        axis: unescape(fields[0]).map_err(&bad)?,
        name: unescape(fields[1]).map_err(&bad)?,
        is_flow_state,
        engagement: metric(3)?,
        energy: metric(4)?,
        date: int(5)?,
        note: unescape(fields[6]).map_err(&bad)?,
        tags: split_tags(fields[7]).map_err(&bad)?.into_iter().collect(),
    };
    reflection.validate().map_err(|e| bad(e.to_string()))?;
    Ok(reflection)
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn escape_tag(tag: &str) -> String {
    escape(tag).replace(TAG_SEPARATOR, "\\;")
}

fn unescape_char(next: Option<char>) -> std::result::Result<char, String> {
    match next {
        Some('\\') => Ok('\\'),
        Some('t') => Ok('\t'),
        Some('r') => Ok('\r'),
        Some('n') => Ok('\n'),
        Some(';') => Ok(';'),
        Some(other) => Err(format!("unknown escape \\{}", other)),
        None => Err("dangling backslash".to_string()),
    }
}

fn unescape(field: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(unescape_char(chars.next())?);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Split on unescaped `;`. An empty field has no tags.
fn split_tags(field: &str) -> std::result::Result<Vec<String>, String> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    let mut tags = Vec::new();
    let mut current = String::new();
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.push(unescape_char(chars.next())?),
            TAG_SEPARATOR => tags.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    tags.push(current);
    Ok(tags)
}
