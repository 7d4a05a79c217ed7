use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BenchError, Result};
use crate::schedule::Variant;

/// What to do with completed trials when a later trial fails.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Write nothing; the run is invalid as a whole.
    #[default]
    Discard,
    /// Persist the raw per-trial CSV of completed trials for post-mortem analysis.
    /// Summary reports are still never written.
    KeepRaw,
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub trials: u32,
    pub seed: u64,
    pub on_failure: FailurePolicy,
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.trials < 1 {
            return Err(BenchError::config("TRIALS must be >= 1"));
        }
        Ok(())
    }

    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

/// A program plus arguments, invoked directly (no shell).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CommandSpec", into = "CommandSpec")]
pub struct TrialCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl TrialCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

impl FromStr for TrialCommand {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| BenchError::config("empty command"))?;
        Ok(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for TrialCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Suite files accept either `"./run.sh --flag"` or `["./run.sh", "--flag"]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl TryFrom<CommandSpec> for TrialCommand {
    type Error = BenchError;

    fn try_from(spec: CommandSpec) -> Result<Self> {
        match spec {
            CommandSpec::Line(line) => line.parse(),
            CommandSpec::Argv(mut argv) => {
                if argv.is_empty() {
                    return Err(BenchError::config("empty command"));
                }
                let program = PathBuf::from(argv.remove(0));
                Ok(Self {
                    program,
                    args: argv,
                })
            }
        }
    }
}

impl From<TrialCommand> for CommandSpec {
    fn from(cmd: TrialCommand) -> Self {
        let mut argv = vec![cmd.program.to_string_lossy().into_owned()];
        argv.extend(cmd.args);
        CommandSpec::Argv(argv)
    }
}

/// Environment overrides and working directory for exactly one trial.
///
/// Built fresh for every trial and handed to the runner by reference; the
/// harness never touches its own process environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrialEnv {
    vars: BTreeMap<String, OsString>,
    workdir: Option<PathBuf>,
}

impl TrialEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_path(self, key: impl Into<String>, path: &Path) -> Self {
        self.with(key, path.as_os_str().to_os_string())
    }

    pub fn in_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.workdir = dir;
        self
    }

    /// Layer `other` on top of `self`; keys in `other` win.
    pub fn merged(&self, other: &TrialEnv) -> TrialEnv {
        let mut vars = self.vars.clone();
        vars.extend(other.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        TrialEnv {
            vars,
            workdir: other.workdir.clone().or_else(|| self.workdir.clone()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.vars.get(key)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&String, &OsString)> {
        self.vars.iter()
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }
}

#[derive(Clone, Debug)]
pub struct TrialOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl TrialOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes one trial. Blocking; no timeout.
pub trait TrialRunner {
    fn run(&mut self, command: &TrialCommand, env: &TrialEnv) -> io::Result<TrialOutput>;
}

/// Runs trials as child processes, timing them with the monotonic clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl TrialRunner for ProcessRunner {
    fn run(&mut self, command: &TrialCommand, env: &TrialEnv) -> io::Result<TrialOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(env.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = env.workdir() {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let output = cmd.output()?;
        let elapsed = start.elapsed();

        Ok(TrialOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            elapsed,
        })
    }
}

/// Run one trial of `variant`, failing fast on a non-zero exit.
pub fn run_checked<R: TrialRunner + ?Sized>(
    runner: &mut R,
    variant: &Variant,
    env: &TrialEnv,
) -> Result<TrialOutput> {
    debug!(variant = %variant.name, command = %variant.command, ?env, "starting trial");
    let output = runner
        .run(&variant.command, env)
        .map_err(|source| BenchError::Launch {
            variant: variant.name.clone(),
            source,
        })?;
    if !output.success() {
        return Err(BenchError::TrialFailed {
            variant: variant.name.clone(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    Ok(output)
}
