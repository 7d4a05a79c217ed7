//! Parsers for the two log formats trial scripts leave behind.
//!
//! ```text
//! key-value log            counter table (perf stat -x,)
//! OSDI_FILE_OPENS=2        # started on ...
//! OSDI_PROBE_GROUP=osdi    12.41,msec,task-clock,12410000,100.00,,
//!                          1,523,,osdi:eval_0,100.00,,
//! ```
//!
//! Both skip blank lines and `#` comments. Neither fails on a malformed
//! line; such lines are dropped.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{BenchError, Result};
use crate::metrics::CounterTable;

/// Value fields meaning the event was requested but produced nothing.
const NOT_COUNTED: &[&str] = &["<not counted>", "<not supported>", ""];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KvLog {
    entries: BTreeMap<String, String>,
}

impl KvLog {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_u64(&self, key: &str, context: &str) -> Result<u64> {
        let raw = self
            .get(key)
            .ok_or_else(|| BenchError::parse(context, format!("missing key {key}")))?;
        raw.parse().map_err(|_| {
            BenchError::parse(context, format!("{key}={raw} is not a non-negative integer"))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.entries
    }
}

fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

pub fn parse_key_values(text: &str) -> KvLog {
    let mut entries = BTreeMap::new();
    for line in content_lines(text) {
        if let Some((key, value)) = line.split_once('=') {
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    KvLog { entries }
}

/// A three-digit thousands group, optionally carrying the decimal part: `234`, `234.5`.
fn is_digit_group(field: &str) -> bool {
    let (int, _) = field.split_once('.').unwrap_or((field, ""));
    int.len() == 3 && int.bytes().all(|b| b.is_ascii_digit())
}

/// Split one counter line into (value text, unit, event), re-joining a
/// value that was itself written with thousands separators.
fn split_counter_line(line: &str) -> Option<(String, &str, &str)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return None;
    }

    let mut value = fields[0].to_string();
    let mut next = 1;
    let leading_numeric = fields[0]
        .trim_start_matches(['-', '+'])
        .bytes()
        .all(|b| b.is_ascii_digit())
        && !fields[0].is_empty();
    if leading_numeric {
        // Only treat fields as groups while a unit and an event still follow.
        while next + 2 < fields.len() && !value.contains('.') && is_digit_group(fields[next]) {
            value.push_str(fields[next]);
            next += 1;
        }
    }

    let unit = *fields.get(next)?;
    let event = *fields.get(next + 1)?;
    Some((value, unit, event))
}

pub fn parse_counter_table(text: &str) -> CounterTable {
    let mut table = CounterTable::new();
    for line in content_lines(text) {
        let Some((value, unit, event)) = split_counter_line(line) else {
            continue;
        };
        if event.is_empty() || NOT_COUNTED.contains(&value.as_str()) {
            continue;
        }
        let Ok(numeric) = value.replace(',', "").parse::<f64>() else {
            continue;
        };
        table.insert(event, numeric, unit);
    }
    table
}

fn read_log(path: &Path, context: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| BenchError::parse(context, format!("cannot read {}: {e}", path.display())))
}

pub fn read_key_values(path: &Path, context: &str) -> Result<KvLog> {
    read_log(path, context).map(|text| parse_key_values(&text))
}

pub fn read_counter_table(path: &Path, context: &str) -> Result<CounterTable> {
    read_log(path, context).map(|text| parse_counter_table(&text))
}
