//! Per-bin elision sweep.
//!
//! Phase 1 times the unelided variants `baseline_trials` times. Phase 2
//! repoints the shared model link at each discovered bin in turn and times
//! every elided variant once per bin. Both phases run in a fixed order;
//! the link can only point at one bin at a time.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::bins::{check_count, discover, sha256_hex, BinFile, ModelLink};
use crate::config::BinsConfig;
use crate::error::{BenchError, Result};
use crate::harness::{run_checked, BenchConfig, TrialEnv, TrialRunner};
use crate::report::{
    name_width, pooled_rows, progress_line, seconds, write_atomic, CsvTable, MarkdownReport,
};
use crate::schedule::{check_variants, Slot, TrialLog, TrialRecord, Variant};
use crate::schema::{BenchReport, BinRecord, RunMeta};
use crate::suites::{abort_run, variant_reports, write_csv, write_json, write_markdown};

pub const UNELIDED: &str = "unelided";
pub const ELIDED: &str = "elided";

#[derive(Clone, Debug, Default)]
pub struct SweepOutputs {
    pub unelided_csv: Option<PathBuf>,
    pub elided_csv: Option<PathBuf>,
    pub markdown: Option<PathBuf>,
    pub methodology: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct SweepArgs {
    pub unelided: Vec<Variant>,
    pub elided: Vec<Variant>,
    pub base_env: TrialEnv,
    pub bins: BinsConfig,
    pub title: String,
    pub outputs: SweepOutputs,
}

/// Split variants by their variation label: `elided` goes to phase 2.
pub fn partition(variants: Vec<Variant>) -> (Vec<Variant>, Vec<Variant>) {
    variants
        .into_iter()
        .partition(|v| v.variation.as_deref() != Some(ELIDED))
}

fn labelled(variants: &[Variant], variation: &str) -> Vec<Variant> {
    variants
        .iter()
        .cloned()
        .map(|mut v| {
            v.variation.get_or_insert_with(|| variation.to_string());
            v
        })
        .collect()
}

fn column_header(first: &str, variants: &[Variant]) -> Vec<String> {
    let mut header = vec![first.to_string()];
    header.extend(variants.iter().map(|v| format!("{}_s", v.name)));
    header
}

struct Sweep<'a, R: ?Sized> {
    runner: &'a mut R,
    variants: &'a [Variant],
    base_env: &'a TrialEnv,
    log: TrialLog,
    total: usize,
    width: usize,
}

impl<R: TrialRunner + ?Sized> Sweep<'_, R> {
    /// Run one variant once, report progress and append the record; returns elapsed seconds.
    fn trial(&mut self, variant: usize, repetition: u32, out: &mut dyn Write) -> Result<f64> {
        let v = &self.variants[variant];
        let slot = Slot {
            index: self.log.len() + 1,
            total: self.total,
            variant,
            repetition,
        };
        let output = run_checked(&mut *self.runner, v, self.base_env)?;
        let record = TrialRecord::timed(&slot, &output);
        let elapsed = record.elapsed;
        debug!(variant = %v.name, index = slot.index, repetition, elapsed, "trial done");
        writeln!(out, "{}", progress_line(&slot, &v.name, self.width, elapsed))?;
        self.log.push(record);
        Ok(elapsed)
    }
}

pub fn run<R: TrialRunner + ?Sized>(
    cfg: &BenchConfig,
    args: &SweepArgs,
    runner: &mut R,
    out: &mut dyn Write,
) -> Result<BenchReport> {
    cfg.validate()?;
    if args.unelided.is_empty() || args.elided.is_empty() {
        return Err(BenchError::config(
            "bins mode needs at least one unelided and one elided variant",
        ));
    }

    let mut variants = labelled(&args.unelided, UNELIDED);
    variants.extend(labelled(&args.elided, ELIDED));
    check_variants(&variants)?;
    let split = args.unelided.len();

    let bins = discover(&args.bins.dir, &args.bins.prefix, &args.bins.suffix)?;
    check_count(&bins, args.bins.expected, &args.bins.dir)?;
    let link = ModelLink::new(&args.bins.link);
    info!(
        bins = bins.len(),
        baseline_trials = cfg.trials,
        link = %link.path().display(),
        "starting bin sweep"
    );

    let mut sweep = Sweep {
        runner,
        variants: &variants,
        base_env: &args.base_env,
        log: TrialLog::new(),
        total: cfg.trials as usize * split + bins.len() * (variants.len() - split),
        width: name_width(&variants),
    };
    let mut baseline = CsvTable::new(column_header("trial", &variants[..split]));
    let mut elided = CsvTable::new(column_header("bin", &variants[split..]));

    let outcome = run_phases(
        cfg,
        &mut sweep,
        split,
        &bins,
        &link,
        &mut baseline,
        &mut elided,
        out,
    );
    if let Err(err) = outcome {
        return Err(abort_run(
            cfg,
            &[
                (args.outputs.unelided_csv.as_ref(), baseline),
                (args.outputs.elided_csv.as_ref(), elided),
            ],
            err,
        ));
    }
    let log = sweep.log;

    write_csv(args.outputs.unelided_csv.as_ref(), &baseline)?;
    write_csv(args.outputs.elided_csv.as_ref(), &elided)?;

    let markdown = MarkdownReport {
        title: args.title.clone(),
        setup: setup_lines(cfg, args, &variants, split, bins.len()),
        rows: pooled_rows(&variants, &log),
        notes: vec![
            "Elided samples pool one run per bin; unelided samples pool the baseline trials.".to_string(),
            "Quartiles are inclusive quartiles over collected samples.".to_string(),
        ],
    };
    write_markdown(args.outputs.markdown.as_ref(), &markdown)?;

    if let Some(path) = &args.outputs.methodology {
        write_atomic(path, methodology(args, &variants, split).as_bytes())?;
        info!(path = %path.display(), "wrote methodology");
    }

    let bin_records = bins
        .iter()
        .map(|b| {
            Ok(BinRecord {
                id: b.id.clone(),
                path: b.path.display().to_string(),
                sha256: sha256_hex(&b.path)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let report = BenchReport {
        run: RunMeta::new("bins", cfg.trials, cfg.seed),
        variants: variant_reports(&variants, &log),
        bins: bin_records,
    };
    write_json(args.outputs.json.as_ref(), &report)?;
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn run_phases<R: TrialRunner + ?Sized>(
    cfg: &BenchConfig,
    sweep: &mut Sweep<'_, R>,
    split: usize,
    bins: &[BinFile],
    link: &ModelLink,
    baseline: &mut CsvTable,
    elided: &mut CsvTable,
    out: &mut dyn Write,
) -> Result<()> {
    let count = sweep.variants.len();

    for i in 1..=cfg.trials {
        let mut row = vec![i.to_string()];
        for v in 0..split {
            row.push(seconds(sweep.trial(v, i, &mut *out)?));
        }
        baseline.push(row);
        writeln!(out, "[baseline {:02}/{}] done", i, cfg.trials)?;
    }

    for (i, bin) in bins.iter().enumerate() {
        link.repoint(&bin.path)?;
        let mut row = vec![bin.id.clone()];
        for v in split..count {
            link.verify(&bin.path)?;
            row.push(seconds(sweep.trial(v, i as u32 + 1, &mut *out)?));
        }
        elided.push(row);
        writeln!(
            out,
            "[elided {:03}/{}] bin={} done",
            i + 1,
            bins.len(),
            bin.id
        )?;
    }
    Ok(())
}

fn script_list(variants: &[Variant]) -> impl Iterator<Item = String> + '_ {
    variants.iter().map(|v| format!("  - `{}`", v.command))
}

fn setup_lines(
    cfg: &BenchConfig,
    args: &SweepArgs,
    variants: &[Variant],
    split: usize,
    bin_count: usize,
) -> Vec<String> {
    let pattern = args
        .bins
        .dir
        .join(format!("{}*{}", args.bins.prefix, args.bins.suffix));
    let mut lines = vec![
        format!(
            "- Elided path was run across all {bin_count} bin files: `{}`.",
            pattern.display()
        ),
        format!(
            "- For each bin, `{}` was relinked to that bin file before running elided scripts.",
            file_name(&args.bins.link)
        ),
        "- Elided scripts per bin:".to_string(),
    ];
    lines.extend(script_list(&variants[split..]));
    lines.push(format!("- Unelided baseline: {} trials each of:", cfg.trials));
    lines.extend(script_list(&variants[..split]));

    let raw: Vec<&PathBuf> = [&args.outputs.elided_csv, &args.outputs.unelided_csv]
        .into_iter()
        .flatten()
        .collect();
    if !raw.is_empty() {
        lines.push("- Raw data:".to_string());
        lines.extend(raw.iter().map(|p| format!("  - `{}`", p.display())));
    }
    lines
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn methodology(args: &SweepArgs, variants: &[Variant], split: usize) -> String {
    let pattern = args
        .bins
        .dir
        .join(format!("{}*{}", args.bins.prefix, args.bins.suffix));
    let mut lines = vec![
        "# Elide Per-Bin Benchmark Methodology".to_string(),
        String::new(),
        format!("1. Collect the bin-specific elided models at `{}`.", pattern.display()),
        "2. For each bin file:".to_string(),
        format!("- relink `{}` to that bin file", args.bins.link.display()),
    ];
    lines.extend(
        variants[split..]
            .iter()
            .map(|v| format!("- run `{}`", v.command)),
    );
    lines.push("3. Collect elapsed wall-clock seconds for each run.".to_string());
    lines.push(
        "4. Collect the unelided baseline via repeated runs of the unelided scripts.".to_string(),
    );
    lines.push(
        "5. Aggregate stats (mean, median, Q1, Q3, min, max) for elided vs unelided.".to_string(),
    );
    match &args.outputs.markdown {
        Some(path) => lines.push(format!("6. Write report to `{}`.", path.display())),
        None => lines.push("6. Print the per-trial progress; no report file.".to_string()),
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
