//! Console, CSV and Markdown rendering.
//!
//! Files are written once, at the end of a run, through [`write_atomic`]:
//! readers either see the previous file or the complete new one.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;
use crate::metrics::Metric;
use crate::schedule::{Slot, TrialLog, TrialRecord, Variant};
use crate::stats::{mean_or_zero, std_dev_or_zero, Summary};

/// Probe events shown as columns of the counter summary table.
pub const SUMMARY_PROBES: &[&str] = &["eval_0", "setup_model_0", "setup_instance_0"];

/// Counter events averaged in the performance-counter table.
pub const TABLE_EVENTS: &[&str] = &["task-clock", "context-switches", "cpu-migrations"];

/// Write `contents` to `path` via a temporary file in the same directory.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn name_width(variants: &[Variant]) -> usize {
    variants.iter().map(|v| v.name.len()).max().unwrap_or(0)
}

pub fn progress_line(slot: &Slot, name: &str, width: usize, elapsed: f64) -> String {
    format!(
        "[{:02}/{}] {:<width$} {:.3}s",
        slot.index, slot.total, name, elapsed,
    )
}

/// Progress line for the counter-aware path.
pub fn counter_progress_line(
    slot: &Slot,
    name: &str,
    width: usize,
    record: &TrialRecord,
) -> String {
    let calls = record.get(&Metric::RuntimeCalls).unwrap_or(0.0);
    let opens = record.get(&Metric::FileOpens).unwrap_or(0.0);
    format!(
        "{} osdi_calls={} osdi_file_opens={}",
        progress_line(slot, name, width, record.elapsed),
        calls as u64,
        opens as u64,
    )
}

/// `- name n=.. mean=.. ...` per variant, in variant order.
pub fn summary_lines(variants: &[Variant], log: &TrialLog) -> Vec<String> {
    let width = name_width(variants);
    variants
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let series = log.series(i, &Metric::WallTime);
            match Summary::from_samples(&series) {
                Some(s) => format!("- {:<width$} {}", v.name, s.describe("s")),
                None => format!("- {:<width$} n=0", v.name),
            }
        })
        .collect()
}

/// Tab-separated summary of times, library opens and probe counts.
pub fn counter_summary_table(variants: &[Variant], log: &TrialLog) -> String {
    let mut headers = vec![
        "script".to_string(),
        "n".to_string(),
        "time_mean_s".to_string(),
        "time_std_s".to_string(),
        "file_opens_mean".to_string(),
    ];
    headers.extend(SUMMARY_PROBES.iter().map(|p| format!("{}_mean", p.trim_end_matches("_0"))));
    headers.push("runtime_calls_mean".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "{}", headers.join("\t"));
    for (i, v) in variants.iter().enumerate() {
        let times = log.series(i, &Metric::WallTime);
        let mut row = vec![
            v.name.clone(),
            times.len().to_string(),
            format!("{:.3}", mean_or_zero(&times)),
            format!("{:.3}", std_dev_or_zero(&times)),
            format!("{:.1}", mean_or_zero(&log.series(i, &Metric::FileOpens))),
        ];
        for probe in SUMMARY_PROBES {
            let values = log.series(i, &Metric::Probe(probe.to_string()));
            row.push(format!("{:.1}", mean_or_zero(&values)));
        }
        row.push(format!(
            "{:.1}",
            mean_or_zero(&log.series(i, &Metric::RuntimeCalls))
        ));
        let _ = writeln!(out, "{}", row.join("\t"));
    }
    out
}

/// Tab-separated means of selected counter events; `n/a` where never recorded.
pub fn perf_counter_table(variants: &[Variant], log: &TrialLog, events: &[String]) -> String {
    let mut out = String::new();
    let mut headers = vec!["script".to_string()];
    headers.extend(events.iter().map(|e| format!("{e}_mean")));
    let _ = writeln!(out, "{}", headers.join("\t"));

    for (i, v) in variants.iter().enumerate() {
        let mut row = vec![v.name.clone()];
        for event in events {
            let values = log.series(i, &Metric::Counter(event.clone()));
            if values.is_empty() {
                row.push("n/a".to_string());
            } else {
                row.push(format!("{:.3}", mean_or_zero(&values)));
            }
        }
        let _ = writeln!(out, "{}", row.join("\t"));
    }
    out
}

pub fn seconds(value: f64) -> String {
    format!("{value:.6}")
}

/// Rows of a CSV file, assembled before anything touches disk.
#[derive(Clone, Debug, Default)]
pub struct CsvTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.header)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.into_inner().map_err(|e| io::Error::other(e.to_string()).into())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes()?)
    }
}

/// `trial,variant,elapsed_s` plus one column per extra metric.
pub fn trial_csv(variants: &[Variant], log: &TrialLog, extra: &[Metric]) -> CsvTable {
    let mut header = vec!["trial".to_string(), "variant".to_string(), "elapsed_s".to_string()];
    header.extend(extra.iter().map(csv_column));
    let mut table = CsvTable::new(header);

    for record in log.records() {
        let name = variants
            .get(record.variant)
            .map(|v| v.name.clone())
            .unwrap_or_default();
        let mut row = vec![record.index.to_string(), name, seconds(record.elapsed)];
        for metric in extra {
            row.push(match record.get(metric) {
                Some(v) => csv_value(metric, v),
                None => String::new(),
            });
        }
        table.push(row);
    }
    table
}

/// Counts are whole numbers; everything else keeps six decimals.
fn csv_value(metric: &Metric, value: f64) -> String {
    match metric {
        Metric::FileOpens | Metric::RuntimeCalls | Metric::Probe(_) => format!("{value:.0}"),
        _ => seconds(value),
    }
}

fn csv_column(metric: &Metric) -> String {
    match metric {
        Metric::Probe(name) => name.clone(),
        Metric::Counter(event) => event.clone(),
        other => other.to_string(),
    }
}

/// One row of the Markdown statistics table.
#[derive(Clone, Debug, PartialEq)]
pub struct StatRow {
    pub benchmark: String,
    pub variation: String,
    pub summary: Summary,
}

/// Pool wall-time samples by (benchmark, variation) in first-seen order.
pub fn pooled_rows(variants: &[Variant], log: &TrialLog) -> Vec<StatRow> {
    let mut groups: Vec<((String, String), Vec<f64>)> = Vec::new();
    for (i, v) in variants.iter().enumerate() {
        let key = (v.benchmark_label().to_string(), v.variation_label().to_string());
        let samples = log.series(i, &Metric::WallTime);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, pooled)) => pooled.extend(samples),
            None => groups.push((key, samples)),
        }
    }
    groups
        .into_iter()
        .filter_map(|((benchmark, variation), samples)| {
            Summary::from_samples(&samples).map(|summary| StatRow {
                benchmark,
                variation,
                summary,
            })
        })
        .collect()
}

/// A Markdown report: setup bullets, statistics table, notes.
#[derive(Clone, Debug, Default)]
pub struct MarkdownReport {
    pub title: String,
    pub setup: Vec<String>,
    pub rows: Vec<StatRow>,
    pub notes: Vec<String>,
}

impl MarkdownReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}", self.title);
        out.push('\n');
        out.push_str("## Run Setup\n");
        for line in &self.setup {
            let _ = writeln!(out, "{line}");
        }
        out.push('\n');
        out.push_str("## Runtime Statistics (seconds)\n\n");
        out.push_str("| Benchmark | Variation | n | Mean | Median | Q1 | Q3 | Min | Max |\n");
        out.push_str("|---|---:|---:|---:|---:|---:|---:|---:|---:|\n");
        for row in &self.rows {
            let s = &row.summary;
            let _ = writeln!(
                out,
                "| {} | {} | {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} |",
                row.benchmark, row.variation, s.n, s.mean, s.median, s.q1, s.q3, s.min, s.max,
            );
        }
        if !self.notes.is_empty() {
            out.push('\n');
            out.push_str("## Notes\n");
            for note in &self.notes {
                let _ = writeln!(out, "- {note}");
            }
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes())
    }
}
