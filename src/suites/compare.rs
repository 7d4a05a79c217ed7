//! Randomized wall-clock comparison of two or more variants.

use std::io::Write;

use tracing::info;

use crate::error::Result;
use crate::harness::{BenchConfig, TrialEnv, TrialRunner};
use crate::report::{name_width, pooled_rows, progress_line, summary_lines, trial_csv, MarkdownReport};
use crate::schedule::{check_variants, Schedule, Slot, TrialHooks, TrialLog, TrialRecord, Variant};
use crate::schema::{BenchReport, RunMeta};
use crate::suites::{abort_run, variant_reports, write_csv, write_json, write_markdown, Outputs};

pub const DEFAULT_TRIALS: u32 = 5;

#[derive(Clone, Debug)]
pub struct CompareArgs {
    pub variants: Vec<Variant>,
    pub base_env: TrialEnv,
    pub title: String,
    pub outputs: Outputs,
}

struct CompareHooks<'a> {
    base_env: &'a TrialEnv,
    width: usize,
    out: &'a mut dyn Write,
}

impl TrialHooks for CompareHooks<'_> {
    fn environment(&mut self, _variant: &Variant, _slot: &Slot) -> Result<TrialEnv> {
        Ok(self.base_env.clone())
    }

    fn completed(&mut self, variant: &Variant, slot: &Slot, record: &TrialRecord) -> Result<()> {
        writeln!(
            self.out,
            "{}",
            progress_line(slot, &variant.name, self.width, record.elapsed)
        )?;
        Ok(())
    }
}

pub fn run<R: TrialRunner + ?Sized>(
    cfg: &BenchConfig,
    args: &CompareArgs,
    runner: &mut R,
    out: &mut dyn Write,
) -> Result<BenchReport> {
    cfg.validate()?;
    check_variants(&args.variants)?;

    let mut rng = cfg.rng();
    let schedule = Schedule::shuffled(args.variants.len(), cfg.trials, &mut rng)?;
    info!(trials = cfg.trials, seed = cfg.seed, variants = args.variants.len(), "starting comparison");

    writeln!(
        out,
        "Running {} trials per script ({} total) in random order...\n",
        cfg.trials,
        schedule.len()
    )?;

    let mut log = TrialLog::new();
    let mut hooks = CompareHooks {
        base_env: &args.base_env,
        width: name_width(&args.variants),
        out: &mut *out,
    };
    if let Err(err) = schedule.execute(&args.variants, runner, &mut hooks, &mut log) {
        let raw = trial_csv(&args.variants, &log, &[]);
        return Err(abort_run(cfg, &[(args.outputs.csv.as_ref(), raw)], err));
    }

    writeln!(out, "\nSummary:")?;
    for line in summary_lines(&args.variants, &log) {
        writeln!(out, "{line}")?;
    }

    write_csv(args.outputs.csv.as_ref(), &trial_csv(&args.variants, &log, &[]))?;

    let markdown = MarkdownReport {
        title: args.title.clone(),
        setup: setup_lines(cfg, &args.variants, schedule.len()),
        rows: pooled_rows(&args.variants, &log),
        notes: vec![
            "Trials of all variants were interleaved in one shuffled order.".to_string(),
            "Timings are monotonic wall-clock seconds per script invocation.".to_string(),
            "Quartiles are inclusive quartiles over collected samples.".to_string(),
        ],
    };
    write_markdown(args.outputs.markdown.as_ref(), &markdown)?;

    let report = BenchReport {
        run: RunMeta::new("compare", cfg.trials, cfg.seed),
        variants: variant_reports(&args.variants, &log),
        bins: Vec::new(),
    };
    write_json(args.outputs.json.as_ref(), &report)?;
    Ok(report)
}

fn setup_lines(cfg: &BenchConfig, variants: &[Variant], total: usize) -> Vec<String> {
    let mut lines = vec![
        format!("- Trials per variant: {} ({} total), shuffled with seed {}.", cfg.trials, total, cfg.seed),
        "- Variants:".to_string(),
    ];
    lines.extend(
        variants
            .iter()
            .map(|v| format!("  - `{}`: `{}`", v.name, v.command)),
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::harness::{FailurePolicy, TrialCommand, TrialOutput};
    use std::io;
    use std::time::Duration;
    use tempfile::tempdir;

    struct FakeRunner {
        calls: usize,
        fail_on: Option<usize>,
    }

    impl TrialRunner for FakeRunner {
        fn run(&mut self, command: &TrialCommand, _env: &TrialEnv) -> io::Result<TrialOutput> {
            self.calls += 1;
            let base = if command.program.ends_with("elided.sh") { 0.5 } else { 1.0 };
            Ok(TrialOutput {
                exit_code: Some(if Some(self.calls) == self.fail_on { 1 } else { 0 }),
                stdout: b"ngspice stdout".to_vec(),
                stderr: b"ngspice stderr".to_vec(),
                elapsed: Duration::from_secs_f64(base + self.calls as f64 * 0.001),
            })
        }
    }

    fn args(dir: &std::path::Path) -> CompareArgs {
        CompareArgs {
            variants: vec![
                Variant::new("bsim4", TrialCommand::new("full.sh")),
                Variant::new("bsim4_elided", TrialCommand::new("elided.sh")),
            ],
            base_env: TrialEnv::new(),
            title: "Inverter".to_string(),
            outputs: Outputs {
                csv: Some(dir.join("raw.csv")),
                markdown: Some(dir.join("report.md")),
                json: Some(dir.join("report.json")),
            },
        }
    }

    fn cfg(trials: u32, on_failure: FailurePolicy) -> BenchConfig {
        BenchConfig {
            trials,
            seed: 2026,
            on_failure,
        }
    }

    #[test]
    fn test_full_run_writes_everything() {
        let dir = tempdir().unwrap();
        let args = args(dir.path());
        let mut runner = FakeRunner {
            calls: 0,
            fail_on: None,
        };
        let mut out = Vec::new();
        let report = run(&cfg(5, FailurePolicy::Discard), &args, &mut runner, &mut out).unwrap();

        assert_eq!(runner.calls, 10);
        assert_eq!(report.variants.len(), 2);
        assert_eq!(report.variants[0].time.unwrap().n, 5);
        assert!(report.variants[1].time.unwrap().mean < report.variants[0].time.unwrap().mean);

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Running 5 trials per script (10 total) in random order...\n\n"));
        assert_eq!(text.lines().filter(|l| l.starts_with('[')).count(), 10);
        assert!(text.contains("[10/10] "));
        assert!(text.contains("\nSummary:\n- bsim4        n=5 mean="));

        let csv = std::fs::read_to_string(dir.path().join("raw.csv")).unwrap();
        assert_eq!(csv.lines().count(), 11);
        assert!(csv.starts_with("trial,variant,elapsed_s\n1,"));
        assert!(dir.path().join("report.md").exists());
        assert!(dir.path().join("report.json").exists());
    }

    #[test]
    fn test_third_of_ten_fails_no_reports() {
        let dir = tempdir().unwrap();
        let args = args(dir.path());
        let mut runner = FakeRunner {
            calls: 0,
            fail_on: Some(3),
        };
        let mut out = Vec::new();
        let err = run(&cfg(5, FailurePolicy::Discard), &args, &mut runner, &mut out).unwrap_err();

        assert!(matches!(err, BenchError::TrialFailed { exit_code: Some(1), .. }));
        assert_eq!(runner.calls, 3);
        assert!(!dir.path().join("raw.csv").exists());
        assert!(!dir.path().join("report.md").exists());
        assert!(!dir.path().join("report.json").exists());
    }

    #[test]
    fn test_keep_raw_persists_completed_trials_only() {
        let dir = tempdir().unwrap();
        let args = args(dir.path());
        let mut runner = FakeRunner {
            calls: 0,
            fail_on: Some(3),
        };
        let mut out = Vec::new();
        run(&cfg(5, FailurePolicy::KeepRaw), &args, &mut runner, &mut out).unwrap_err();

        let csv = std::fs::read_to_string(dir.path().join("raw.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(!dir.path().join("report.md").exists());
        assert!(!dir.path().join("report.json").exists());
    }

    #[test]
    fn test_zero_trials_runs_nothing() {
        let dir = tempdir().unwrap();
        let args = args(dir.path());
        let mut runner = FakeRunner {
            calls: 0,
            fail_on: None,
        };
        let err = run(&cfg(0, FailurePolicy::Discard), &args, &mut runner, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert_eq!(runner.calls, 0);
    }
}
