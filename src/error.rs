use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = BenchError> = std::result::Result<T, E>;

/// Everything that aborts a benchmark run.
///
/// None of these are retried. The binary maps every variant to exit status 1.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Rejected before any trial runs (bad repetition count, wrong bin count, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// A trial exited non-zero. Carries the captured output so it can be replayed.
    #[error("{variant} failed with {}", describe_exit(.exit_code))]
    TrialFailed {
        variant: String,
        exit_code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    /// A trial could not be started at all.
    #[error("failed to launch {variant}: {source}")]
    Launch {
        variant: String,
        #[source]
        source: io::Error,
    },

    /// A log produced by a trial is missing or lacks an expected value.
    #[error("parse failure ({context}): {message}")]
    Parse { context: String, message: String },

    /// The shared model link did not resolve to the file the next trial expects.
    #[error("model link {} does not resolve to {}", .link.display(), .expected.display())]
    Link { link: PathBuf, expected: PathBuf },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("suite file: {0}")]
    Toml(#[from] toml::de::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        BenchError::Config(msg.into())
    }

    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        BenchError::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        1
    }
}
