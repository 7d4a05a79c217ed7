use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use elide_bench::config::{BinsConfig, SuiteConfig};
use elide_bench::harness::{BenchConfig, FailurePolicy, ProcessRunner, TrialEnv};
use elide_bench::report::TABLE_EVENTS;
use elide_bench::schedule::Variant;
use elide_bench::suites::{compare, perf, sweep, Outputs};
use elide_bench::{BenchError, Result};

fn parse_variant(s: &str) -> std::result::Result<Variant, String> {
    Variant::parse_pair(s).map_err(|e| e.to_string())
}

/// Inputs shared by every mode.
#[derive(ClapArgs, Debug)]
struct Common {
    /// Suite file (TOML) with variants, trial environment and bin settings.
    #[arg(long, value_name = "FILE")]
    suite: Option<PathBuf>,

    /// Variant as NAME=COMMAND. Repeatable; added after the suite's variants.
    #[arg(long = "variant", value_name = "NAME=COMMAND", value_parser = parse_variant)]
    variants: Vec<Variant>,

    /// Simulator forwarded to every trial as NGSPICE_BIN.
    #[arg(long, env = "NGSPICE_BIN", value_name = "PATH")]
    simulator: Option<PathBuf>,

    /// Markdown report path.
    #[arg(long, value_name = "FILE")]
    markdown: Option<PathBuf>,

    /// Title of the Markdown report.
    #[arg(long)]
    title: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Randomized wall-clock comparison of two or more variants.
    Compare {
        #[command(flatten)]
        common: Common,

        /// Repetitions per variant [default: suite file, else 5].
        #[arg(long, env = "TRIALS")]
        trials: Option<u32>,

        /// Per-trial CSV (`trial,variant,elapsed_s`).
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },

    /// Comparison with perf counters, probe correlation and library open counts.
    Perf {
        #[command(flatten)]
        common: Common,

        /// Repetitions per variant [default: suite file, else 3].
        #[arg(long, env = "TRIALS")]
        trials: Option<u32>,

        /// Per-trial CSV including file opens, runtime calls and probe counts.
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,

        /// Events handed to the scripts as PERF_EVENTS.
        #[arg(long, env = "PERF_EVENTS", default_value = perf::DEFAULT_PERF_EVENTS)]
        perf_events: String,

        /// Directory receiving the per-trial perf/, strace/ and osdi/ logs.
        #[arg(long, value_name = "DIR", default_value = "artifacts/perf-runs")]
        artifacts: PathBuf,

        /// Counter event averaged in the perf counter table. Repeatable.
        #[arg(long = "table-event", value_name = "EVENT")]
        table_events: Vec<String>,
    },

    /// Per-bin sweep: unelided baseline, then every elided variant once per bin.
    Bins {
        #[command(flatten)]
        common: Common,

        /// Baseline repetitions of the unelided variants [default: suite file, else 10].
        #[arg(long, env = "TRIALS")]
        baseline_trials: Option<u32>,

        /// Elided variant as NAME=COMMAND. Repeatable.
        #[arg(long = "elided", value_name = "NAME=COMMAND", value_parser = parse_variant)]
        elided: Vec<Variant>,

        /// Directory holding the bin files.
        #[arg(long, value_name = "DIR")]
        bin_dir: Option<PathBuf>,

        /// Bin file name prefix.
        #[arg(long)]
        prefix: Option<String>,

        /// Bin file name suffix.
        #[arg(long)]
        suffix: Option<String>,

        /// Exact number of bin files that must be found.
        #[arg(long)]
        expected: Option<usize>,

        /// Symlink the elided variants load their model through.
        #[arg(long, value_name = "PATH")]
        link: Option<PathBuf>,

        #[arg(long, value_name = "FILE")]
        unelided_csv: Option<PathBuf>,

        #[arg(long, value_name = "FILE")]
        elided_csv: Option<PathBuf>,

        /// Methodology document describing the sweep.
        #[arg(long, value_name = "FILE")]
        methodology: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "elide-bench")]
#[command(about = "Randomized elided-vs-unelided simulator benchmark runner")]
struct Args {
    /// Shuffle seed. Random (and logged) when omitted.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Where to write the JSON report.
    #[arg(long, global = true, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Print the JSON report to stdout after the run.
    #[arg(long, global = true)]
    json: bool,

    /// What to keep from completed trials when a later trial fails.
    #[arg(long, value_enum, default_value_t = FailurePolicy::Discard, global = true)]
    on_failure: FailurePolicy,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "elide_bench=debug"
    } else {
        "elide_bench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Suite file contents plus the command line's variants and simulator.
struct Plan {
    suite: SuiteConfig,
    variants: Vec<Variant>,
    base_env: TrialEnv,
}

fn plan(common: &Common) -> Result<Plan> {
    let suite = match &common.suite {
        Some(path) => {
            let suite = SuiteConfig::load(path)?;
            info!(path = %path.display(), variants = suite.variants.len(), "loaded suite");
            suite
        }
        None => SuiteConfig::default(),
    };
    let mut variants = suite.variants.clone();
    variants.extend(common.variants.iter().cloned());

    let mut base_env = suite.base_env();
    if let Some(sim) = &common.simulator {
        base_env = base_env.with_path("NGSPICE_BIN", sim);
    }
    Ok(Plan {
        suite,
        variants,
        base_env,
    })
}

fn bench_config(args: &Args, trials: u32) -> BenchConfig {
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(seed, trials, "benchmark configuration");
    BenchConfig {
        trials,
        seed,
        on_failure: args.on_failure,
    }
}

fn bins_config(
    from_suite: Option<BinsConfig>,
    dir: Option<PathBuf>,
    link: Option<PathBuf>,
    prefix: Option<String>,
    suffix: Option<String>,
    expected: Option<usize>,
) -> Result<BinsConfig> {
    let mut bins = match (from_suite, dir, link) {
        (Some(mut b), dir, link) => {
            if let Some(dir) = dir {
                b.dir = dir;
            }
            if let Some(link) = link {
                b.link = link;
            }
            b
        }
        (None, Some(dir), Some(link)) => BinsConfig {
            dir,
            prefix: "bsim4_bin_".to_string(),
            suffix: ".osdi".to_string(),
            expected: None,
            link,
            baseline_trials: 10,
        },
        (None, _, _) => {
            return Err(BenchError::config(
                "bins mode needs --bin-dir and --link, or a [bins] table in the suite file",
            ))
        }
    };
    if let Some(prefix) = prefix {
        bins.prefix = prefix;
    }
    if let Some(suffix) = suffix {
        bins.suffix = suffix;
    }
    if expected.is_some() {
        bins.expected = expected;
    }
    Ok(bins)
}

fn run(args: Args, out: &mut dyn Write) -> Result<()> {
    let mut runner = ProcessRunner;

    let report = match args.cmd {
        Command::Compare {
            ref common,
            trials,
            ref csv,
        } => {
            let plan = plan(common)?;
            let trials = trials
                .or(plan.suite.trials)
                .unwrap_or(compare::DEFAULT_TRIALS);
            let cfg = bench_config(&args, trials);
            let cargs = compare::CompareArgs {
                variants: plan.variants,
                base_env: plan.base_env,
                title: common
                    .title
                    .clone()
                    .unwrap_or_else(|| "Elision Runtime Comparison".to_string()),
                outputs: Outputs {
                    csv: csv.clone(),
                    markdown: common.markdown.clone(),
                    json: args.out.clone(),
                },
            };
            compare::run(&cfg, &cargs, &mut runner, out)?
        }
        Command::Perf {
            ref common,
            trials,
            ref csv,
            ref perf_events,
            ref artifacts,
            ref table_events,
        } => {
            let plan = plan(common)?;
            let trials = trials.or(plan.suite.trials).unwrap_or(perf::DEFAULT_TRIALS);
            let cfg = bench_config(&args, trials);
            let table_events = if table_events.is_empty() {
                TABLE_EVENTS.iter().map(|e| e.to_string()).collect()
            } else {
                table_events.clone()
            };
            let pargs = perf::PerfArgs {
                variants: plan.variants,
                base_env: plan.base_env,
                artifacts: artifacts.clone(),
                perf_events: perf_events.clone(),
                simulator: common.simulator.clone(),
                table_events,
                title: common
                    .title
                    .clone()
                    .unwrap_or_else(|| "Elision Perf Counter Comparison".to_string()),
                outputs: Outputs {
                    csv: csv.clone(),
                    markdown: common.markdown.clone(),
                    json: args.out.clone(),
                },
            };
            perf::run(&cfg, &pargs, &mut runner, out)?
        }
        Command::Bins {
            ref common,
            baseline_trials,
            ref elided,
            ref bin_dir,
            ref prefix,
            ref suffix,
            expected,
            ref link,
            ref unelided_csv,
            ref elided_csv,
            ref methodology,
        } => {
            let plan = plan(common)?;
            let bins = bins_config(
                plan.suite.bins.clone(),
                bin_dir.clone(),
                link.clone(),
                prefix.clone(),
                suffix.clone(),
                expected,
            )?;
            let trials = baseline_trials.unwrap_or(bins.baseline_trials);
            let cfg = bench_config(&args, trials);

            let (unelided, mut elided_variants) = sweep::partition(plan.variants);
            elided_variants.extend(elided.iter().cloned());
            let sargs = sweep::SweepArgs {
                unelided,
                elided: elided_variants,
                base_env: plan.base_env,
                bins,
                title: common
                    .title
                    .clone()
                    .unwrap_or_else(|| "Elision Per-Bin Runtime Stats".to_string()),
                outputs: sweep::SweepOutputs {
                    unelided_csv: unelided_csv.clone(),
                    elided_csv: elided_csv.clone(),
                    markdown: common.markdown.clone(),
                    methodology: methodology.clone(),
                    json: args.out.clone(),
                },
            };
            sweep::run(&cfg, &sargs, &mut runner, out)?
        }
    };

    info!(
        mode = %report.run.mode,
        variants = report.variants.len(),
        "benchmark complete"
    );
    if args.json {
        writeln!(out, "{}", report.to_json()?)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(args.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run(args, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = out.flush();
            let mut errout = io::stderr().lock();
            if let BenchError::TrialFailed { stdout, stderr, .. } = &err {
                let _ = errout.write_all(stdout);
                let _ = errout.write_all(stderr);
            }
            // Reported regardless of the log filter.
            let _ = writeln!(errout, "elide-bench: {err}");
            let _ = errout.flush();
            debug!(error = ?err, "benchmark aborted");
            ExitCode::from(err.exit_code())
        }
    }
}
