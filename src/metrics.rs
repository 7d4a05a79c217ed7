//! Typed per-trial measurements.
//!
//! Every number a trial produces is keyed by a [`Metric`]. Counter lookups
//! that find nothing yield zero; that policy lives in
//! [`CounterTable::count_or_zero`] and nowhere else.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::logs::KvLog;

pub const PROBE_GROUP_KEY: &str = "OSDI_PROBE_GROUP";
pub const PROBE_EVENTS_KEY: &str = "OSDI_PROBE_EVENTS";
pub const FILE_OPENS_KEY: &str = "OSDI_FILE_OPENS";
pub const INVOCATIONS_KEY: &str = "OSDI_INVOCATIONS";

pub const DEFAULT_PROBE_GROUP: &str = "osdi";
pub const DEFAULT_PROBE_EVENTS: &str = "eval_0,setup_model_0,setup_instance_0";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Metric {
    /// Elapsed seconds for the whole trial.
    WallTime,
    /// Number of times the device model library was opened.
    FileOpens,
    /// Sum of all declared probe counters.
    RuntimeCalls,
    /// One declared probe event, by its short name (`eval_0`).
    Probe(String),
    /// Any event from the counter table, by its full name (`task-clock`).
    Counter(String),
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::WallTime => f.write_str("elapsed_s"),
            Metric::FileOpens => f.write_str("file_opens"),
            Metric::RuntimeCalls => f.write_str("runtime_calls"),
            Metric::Probe(name) => write!(f, "probe:{name}"),
            Metric::Counter(event) => write!(f, "counter:{event}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub value: f64,
    pub unit: String,
}

/// Parsed counter report: event name to value and unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CounterTable {
    events: BTreeMap<String, Counter>,
}

impl CounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later inserts for the same event replace earlier ones.
    pub fn insert(&mut self, event: impl Into<String>, value: f64, unit: impl Into<String>) {
        self.events.insert(
            event.into(),
            Counter {
                value,
                unit: unit.into(),
            },
        );
    }

    pub fn get(&self, event: &str) -> Option<&Counter> {
        self.events.get(event)
    }

    /// Integral count for `event`, or zero when the event was not recorded.
    pub fn count_or_zero(&self, event: &str) -> u64 {
        self.events
            .get(event)
            .map(|c| if c.value > 0.0 { c.value as u64 } else { 0 })
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Counter)> {
        self.events.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// The probe group and events a trial declared in its key-value log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSet {
    pub group: String,
    pub events: Vec<String>,
}

impl ProbeSet {
    pub fn from_log(log: &KvLog) -> Self {
        let group = log
            .get(PROBE_GROUP_KEY)
            .unwrap_or(DEFAULT_PROBE_GROUP)
            .to_string();
        let events = log
            .get(PROBE_EVENTS_KEY)
            .unwrap_or(DEFAULT_PROBE_EVENTS)
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        Self { group, events }
    }

    /// Counter-table key for one probe event, e.g. `osdi:eval_0`.
    pub fn qualified(&self, event: &str) -> String {
        format!("{}:{}", self.group, event)
    }

    pub fn correlate(&self, table: &CounterTable) -> ProbeCounts {
        let counts = self
            .events
            .iter()
            .map(|event| (event.clone(), table.count_or_zero(&self.qualified(event))))
            .collect();
        ProbeCounts { counts }
    }
}

/// Per-probe counts for one trial, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeCounts {
    counts: Vec<(String, u64)>,
}

impl ProbeCounts {
    pub fn get(&self, event: &str) -> u64 {
        self.counts
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn runtime_calls(&self) -> u64 {
        self.counts.iter().map(|(_, v)| v).sum()
    }
}

/// Library open count: `OSDI_FILE_OPENS`, else `OSDI_INVOCATIONS`, else zero.
pub fn file_opens(log: &KvLog, context: &str) -> Result<u64> {
    if log.get(FILE_OPENS_KEY).is_some() {
        return log.get_u64(FILE_OPENS_KEY, context);
    }
    if log.get(INVOCATIONS_KEY).is_some() {
        return log.get_u64(INVOCATIONS_KEY, context);
    }
    Ok(0)
}
