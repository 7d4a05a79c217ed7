//! Suite files.
//!
//! A suite file names the variants to benchmark and anything they need
//! from their environment:
//!
//! ```toml
//! trials = 5
//! workdir = "tests/sky-use/skywater-examples"
//!
//! [env]
//! NGSPICE_BIN = "/opt/ngspice/bin/ngspice"
//!
//! [[variant]]
//! name = "sim1_bsim4_300"
//! command = "run-scripts/run_track_hold_sim1_bsim4_300.sh"
//! benchmark = "track_and_hold"
//! variation = "unelided"
//!
//! [bins]
//! dir = "artifacts/osdi/pfet_01v8_bins"
//! prefix = "bsim4_bin_"
//! suffix = ".osdi"
//! expected = 108
//! link = "integration_tests/BSIM4/bsim4.elided.osdi"
//! baseline_trials = 10
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::harness::TrialEnv;
use crate::schedule::Variant;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Repetitions per variant, unless overridden on the command line.
    #[serde(default)]
    pub trials: Option<u32>,
    /// Working directory for every trial.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Extra environment passed to every trial.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, rename = "variant")]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub bins: Option<BinsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinsConfig {
    pub dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Exact number of bin files that must be discovered.
    #[serde(default)]
    pub expected: Option<usize>,
    /// The indirection every elided trial loads its model through.
    pub link: PathBuf,
    #[serde(default = "default_baseline_trials")]
    pub baseline_trials: u32,
}

fn default_prefix() -> String {
    "bsim4_bin_".to_string()
}

fn default_suffix() -> String {
    ".osdi".to_string()
}

fn default_baseline_trials() -> u32 {
    10
}

impl SuiteConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Environment shared by every trial of the suite.
    pub fn base_env(&self) -> TrialEnv {
        self.env
            .iter()
            .fold(TrialEnv::new(), |env, (k, v)| env.with(k.clone(), v.clone()))
            .in_dir(self.workdir.clone())
    }
}
