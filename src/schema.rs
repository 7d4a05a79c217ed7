use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stats::Summary;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub mode: String,
    pub trials: u32,
    pub seed: u64,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

impl RunMeta {
    pub fn new(mode: &str, trials: u32, seed: u64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: mode.to_string(),
            trials,
            seed,
            timestamp_utc: now_utc(),
            git_sha: git_sha_short(),
        }
    }
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantReport {
    pub name: String,
    pub command: String,
    pub benchmark: String,
    pub variation: String,
    /// Wall-clock seconds.
    pub time: Option<Summary>,
    /// Summaries of every other recorded metric, keyed by metric label.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, Summary>,
    /// Counter units as reported by the first trial that saw them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub units: BTreeMap<String, String>,
}

/// Provenance of one elided model bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinRecord {
    pub id: String,
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub run: RunMeta,
    pub variants: Vec<VariantReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bins: Vec<BinRecord>,
}

impl BenchReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
