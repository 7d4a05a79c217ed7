//! Counter-aware comparison.
//!
//! Each trial script is told where to leave three logs:
//!
//! | variable     | content                                                |
//! |--------------|--------------------------------------------------------|
//! | `PERF_LOG`   | `perf stat -x,` counter table, incl. probe events       |
//! | `STRACE_LOG` | syscall trace (kept for inspection, not parsed)        |
//! | `OSDI_LOG`   | key-value log: file opens, probe group, probe events   |
//!
//! Probe counters are correlated per trial and summed into a runtime call
//! count alongside the wall time.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::error::{BenchError, Result};
use crate::harness::{BenchConfig, TrialEnv, TrialOutput, TrialRunner};
use crate::logs::{read_counter_table, read_key_values};
use crate::metrics::{file_opens, Metric, ProbeSet};
use crate::report::{
    counter_progress_line, counter_summary_table, name_width, perf_counter_table, pooled_rows,
    trial_csv, MarkdownReport,
};
use crate::schedule::{check_variants, Schedule, Slot, TrialHooks, TrialLog, TrialRecord, Variant};
use crate::schema::{BenchReport, RunMeta};
use crate::suites::{abort_run, variant_reports, write_csv, write_json, write_markdown, Outputs};

pub const DEFAULT_TRIALS: u32 = 3;

pub const DEFAULT_PERF_EVENTS: &str = "task-clock,cycles,instructions,branches,branch-misses,\
cache-misses,context-switches,cpu-migrations";

#[derive(Clone, Debug)]
pub struct PerfArgs {
    pub variants: Vec<Variant>,
    pub base_env: TrialEnv,
    /// Root for the `perf/`, `strace/` and `osdi/` log directories.
    pub artifacts: PathBuf,
    /// Comma-separated events handed to the scripts as `PERF_EVENTS`.
    pub perf_events: String,
    /// Simulator binary handed to the scripts as `NGSPICE_BIN`.
    pub simulator: Option<PathBuf>,
    /// Events averaged in the counter table.
    pub table_events: Vec<String>,
    pub title: String,
    pub outputs: Outputs,
}

#[derive(Clone, Debug)]
struct TrialLogs {
    perf: PathBuf,
    osdi: PathBuf,
}

struct PerfHooks<'a> {
    args: &'a PerfArgs,
    rng: ChaCha8Rng,
    width: usize,
    pending: Option<TrialLogs>,
    out: &'a mut dyn Write,
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

fn log_dir(root: &Path, kind: &str) -> Result<PathBuf> {
    let dir = root.join(kind);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

impl TrialHooks for PerfHooks<'_> {
    fn environment(&mut self, variant: &Variant, _slot: &Slot) -> Result<TrialEnv> {
        let run_id = format!(
            "{}_{}_{}",
            variant.name,
            unix_nanos(),
            self.rng.next_u32() % 10_000
        );
        let perf = log_dir(&self.args.artifacts, "perf")?.join(format!("{run_id}.perf.csv"));
        let strace = log_dir(&self.args.artifacts, "strace")?.join(format!("{run_id}.strace.log"));
        let osdi = log_dir(&self.args.artifacts, "osdi")?.join(format!("{run_id}.osdi.txt"));

        let mut overlay = TrialEnv::new()
            .with_path("PERF_LOG", &perf)
            .with_path("STRACE_LOG", &strace)
            .with_path("OSDI_LOG", &osdi)
            .with("PERF_EVENTS", self.args.perf_events.clone())
            .with("LC_ALL", "C")
            .with("LANG", "C");
        if let Some(sim) = &self.args.simulator {
            overlay = overlay.with_path("NGSPICE_BIN", sim);
        }

        self.pending = Some(TrialLogs { perf, osdi });
        Ok(self.args.base_env.merged(&overlay))
    }

    fn collect(
        &mut self,
        variant: &Variant,
        slot: &Slot,
        output: &TrialOutput,
        log: &mut TrialLog,
    ) -> Result<TrialRecord> {
        let context = format!("{} trial {}", variant.name, slot.index);
        let paths = self
            .pending
            .take()
            .ok_or_else(|| BenchError::parse(&context, "no log paths were assigned"))?;

        let osdi = read_key_values(&paths.osdi, &context)?;
        let counters = read_counter_table(&paths.perf, &context)?;
        let opens = file_opens(&osdi, &context)?;
        let probes = ProbeSet::from_log(&osdi).correlate(&counters);
        debug!(%context, opens, calls = probes.runtime_calls(), events = counters.len(), "parsed trial logs");

        let mut record = TrialRecord::timed(slot, output)
            .with(Metric::FileOpens, opens as f64)
            .with(Metric::RuntimeCalls, probes.runtime_calls() as f64);
        for (name, count) in probes.iter() {
            record = record.with(Metric::Probe(name.to_string()), count as f64);
        }
        for (event, counter) in counters.iter() {
            log.note_unit(event, &counter.unit);
            record = record.with(Metric::Counter(event.to_string()), counter.value);
        }
        Ok(record)
    }

    fn completed(&mut self, variant: &Variant, slot: &Slot, record: &TrialRecord) -> Result<()> {
        writeln!(
            self.out,
            "{}",
            counter_progress_line(slot, &variant.name, self.width, record)
        )?;
        Ok(())
    }
}

/// File opens, runtime calls and every probe any trial declared, for CSV columns.
fn csv_metrics(log: &TrialLog) -> Vec<Metric> {
    let mut probes: Vec<Metric> = log
        .records()
        .iter()
        .flat_map(|r| r.metrics.keys())
        .filter(|m| matches!(m, Metric::Probe(_)))
        .cloned()
        .collect();
    probes.sort();
    probes.dedup();

    let mut columns = vec![Metric::FileOpens, Metric::RuntimeCalls];
    columns.extend(probes);
    columns
}

pub fn run<R: TrialRunner + ?Sized>(
    cfg: &BenchConfig,
    args: &PerfArgs,
    runner: &mut R,
    out: &mut dyn Write,
) -> Result<BenchReport> {
    cfg.validate()?;
    check_variants(&args.variants)?;

    let mut rng = cfg.rng();
    let schedule = Schedule::shuffled(args.variants.len(), cfg.trials, &mut rng)?;
    info!(
        trials = cfg.trials,
        seed = cfg.seed,
        artifacts = %args.artifacts.display(),
        "starting counter run"
    );

    writeln!(
        out,
        "Running {} trials per script ({} total) in random order...\n",
        cfg.trials,
        schedule.len()
    )?;
    writeln!(out, "Using PERF_EVENTS={}\n", args.perf_events)?;

    let mut log = TrialLog::new();
    let mut hooks = PerfHooks {
        args,
        rng,
        width: name_width(&args.variants),
        pending: None,
        out: &mut *out,
    };
    if let Err(err) = schedule.execute(&args.variants, runner, &mut hooks, &mut log) {
        let raw = trial_csv(&args.variants, &log, &csv_metrics(&log));
        return Err(abort_run(cfg, &[(args.outputs.csv.as_ref(), raw)], err));
    }

    writeln!(out, "\nSummary Table:")?;
    write!(out, "{}", counter_summary_table(&args.variants, &log))?;
    writeln!(out, "\nPerf Counter Table:")?;
    write!(
        out,
        "{}",
        perf_counter_table(&args.variants, &log, &args.table_events)
    )?;

    write_csv(
        args.outputs.csv.as_ref(),
        &trial_csv(&args.variants, &log, &csv_metrics(&log)),
    )?;

    let markdown = MarkdownReport {
        title: args.title.clone(),
        setup: vec![
            format!(
                "- Trials per variant: {} ({} total), shuffled with seed {}.",
                cfg.trials,
                schedule.len(),
                cfg.seed
            ),
            format!("- PERF_EVENTS: `{}`", args.perf_events),
            format!("- Per-trial logs under `{}`.", args.artifacts.display()),
        ],
        rows: pooled_rows(&args.variants, &log),
        notes: vec![
            "Runtime calls are the sum of the probe counters each trial declared.".to_string(),
            "Probe counters missing from a counter table count as zero.".to_string(),
            "Quartiles are inclusive quartiles over collected samples.".to_string(),
        ],
    };
    write_markdown(args.outputs.markdown.as_ref(), &markdown)?;

    let report = BenchReport {
        run: RunMeta::new("perf", cfg.trials, cfg.seed),
        variants: variant_reports(&args.variants, &log),
        bins: Vec::new(),
    };
    write_json(args.outputs.json.as_ref(), &report)?;
    Ok(report)
}
