//! Benchmark modes.
//!
//! Each mode validates its configuration, runs every trial through a
//! [`TrialRunner`](crate::harness::TrialRunner), prints progress to the
//! given writer, and only then writes its files. A failed trial ends the
//! mode with an error before any summary artifact exists.

pub mod compare;
pub mod perf;
pub mod sweep;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{BenchError, Result};
use crate::harness::{BenchConfig, FailurePolicy};
use crate::metrics::Metric;
use crate::report::{CsvTable, MarkdownReport};
use crate::schedule::{TrialLog, Variant};
use crate::schema::{BenchReport, VariantReport};
use crate::stats::Summary;

/// Where a mode writes its artifacts. `None` skips that artifact.
#[derive(Clone, Debug, Default)]
pub struct Outputs {
    pub csv: Option<PathBuf>,
    pub markdown: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

pub(crate) fn variant_reports(variants: &[Variant], log: &TrialLog) -> Vec<VariantReport> {
    variants
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let mut metrics = std::collections::BTreeMap::new();
            let mut units = std::collections::BTreeMap::new();
            for metric in log.metrics_of(i) {
                if metric == Metric::WallTime {
                    continue;
                }
                if let Metric::Counter(event) = &metric {
                    if let Some(unit) = log.unit(event).filter(|u| !u.is_empty()) {
                        units.insert(event.clone(), unit.to_string());
                    }
                }
                if let Some(summary) = Summary::from_samples(&log.series(i, &metric)) {
                    metrics.insert(metric.to_string(), summary);
                }
            }
            VariantReport {
                name: v.name.clone(),
                command: v.command.to_string(),
                benchmark: v.benchmark_label().to_string(),
                variation: v.variation_label().to_string(),
                time: Summary::from_samples(&log.series(i, &Metric::WallTime)),
                metrics,
                units,
            }
        })
        .collect()
}

/// Handle a run that stopped on `err`: optionally keep raw data, then hand the error back.
pub(crate) fn abort_run(
    cfg: &BenchConfig,
    raw: &[(Option<&PathBuf>, CsvTable)],
    err: BenchError,
) -> BenchError {
    warn!(error = %err, "run aborted; no summary report will be written");
    if cfg.on_failure == FailurePolicy::KeepRaw {
        for (path, table) in raw {
            let Some(path) = path else { continue };
            match table.write(path) {
                Ok(()) => info!(
                    path = %path.display(),
                    trials = table.len(),
                    "kept raw results of completed trials"
                ),
                Err(write_err) => warn!(
                    path = %path.display(),
                    error = %write_err,
                    "could not keep raw results"
                ),
            }
        }
    }
    err
}

pub(crate) fn write_markdown(path: Option<&PathBuf>, report: &MarkdownReport) -> Result<()> {
    if let Some(path) = path {
        report.write(path)?;
        info!(path = %path.display(), "wrote markdown report");
    }
    Ok(())
}

pub(crate) fn write_csv(path: Option<&PathBuf>, table: &CsvTable) -> Result<()> {
    if let Some(path) = path {
        table.write(path)?;
        info!(path = %path.display(), rows = table.len(), "wrote csv");
    }
    Ok(())
}

pub(crate) fn write_json(path: Option<&PathBuf>, report: &BenchReport) -> Result<()> {
    if let Some(path) = path {
        crate::report::write_atomic(path, report.to_json()?.as_bytes())?;
        info!(path = %path.display(), "wrote json report");
    }
    Ok(())
}
