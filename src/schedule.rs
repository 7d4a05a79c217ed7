//! Randomized trial scheduling.
//!
//! A run is `trials` repetitions of every variant, shuffled into one
//! sequence so no variant systematically benefits from warm caches or
//! suffers from thermal drift. Trials run strictly one after another.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::harness::{run_checked, TrialCommand, TrialEnv, TrialOutput, TrialRunner};
use crate::metrics::Metric;

/// One named configuration under comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub command: TrialCommand,
    /// Benchmark this variant belongs to (`track_and_hold`, `sweep`, ...).
    #[serde(default)]
    pub benchmark: Option<String>,
    /// `elided` / `unelided`.
    #[serde(default)]
    pub variation: Option<String>,
}

impl Variant {
    pub fn new(name: impl Into<String>, command: TrialCommand) -> Self {
        Self {
            name: name.into(),
            command,
            benchmark: None,
            variation: None,
        }
    }

    pub fn benchmark_label(&self) -> &str {
        self.benchmark.as_deref().unwrap_or(&self.name)
    }

    pub fn variation_label(&self) -> &str {
        self.variation.as_deref().unwrap_or("-")
    }

    /// Parse the command-line form `NAME=COMMAND`.
    pub fn parse_pair(s: &str) -> Result<Variant> {
        let (name, cmd) = s
            .split_once('=')
            .ok_or_else(|| BenchError::config(format!("expected NAME=COMMAND, got {s:?}")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(BenchError::config(format!("variant without a name: {s:?}")));
        }
        Ok(Variant::new(name, cmd.parse()?))
    }
}

/// Reject empty or duplicated variant sets before anything runs.
pub fn check_variants(variants: &[Variant]) -> Result<()> {
    if variants.is_empty() {
        return Err(BenchError::config("no variants configured"));
    }
    for (i, v) in variants.iter().enumerate() {
        if variants[..i].iter().any(|other| other.name == v.name) {
            return Err(BenchError::config(format!("duplicate variant {}", v.name)));
        }
    }
    Ok(())
}

/// Position of one trial in the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    /// 1-based position in the executed sequence.
    pub index: usize,
    pub total: usize,
    pub variant: usize,
    /// 1-based repetition number of this variant.
    pub repetition: u32,
}

/// The measurements of one completed trial.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialRecord {
    pub index: usize,
    pub variant: usize,
    pub elapsed: f64,
    pub metrics: BTreeMap<Metric, f64>,
}

impl TrialRecord {
    pub fn timed(slot: &Slot, output: &TrialOutput) -> Self {
        let elapsed = output.elapsed.as_secs_f64();
        let mut metrics = BTreeMap::new();
        metrics.insert(Metric::WallTime, elapsed);
        Self {
            index: slot.index,
            variant: slot.variant,
            elapsed,
            metrics,
        }
    }

    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.metrics.insert(metric, value);
        self
    }

    pub fn get(&self, metric: &Metric) -> Option<f64> {
        self.metrics.get(metric).copied()
    }
}

/// Completed trials in completion order, plus first-seen counter units.
#[derive(Clone, Debug, Default)]
pub struct TrialLog {
    records: Vec<TrialRecord>,
    units: BTreeMap<String, String>,
}

impl TrialLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    pub fn note_unit(&mut self, event: &str, unit: &str) {
        self.units
            .entry(event.to_string())
            .or_insert_with(|| unit.to_string());
    }

    pub fn unit(&self, event: &str) -> Option<&str> {
        self.units.get(event).map(String::as_str)
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sample series of one metric for one variant, in observed order.
    pub fn series(&self, variant: usize, metric: &Metric) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.variant == variant)
            .filter_map(|r| r.get(metric))
            .collect()
    }

    /// Every metric any trial of `variant` recorded.
    pub fn metrics_of(&self, variant: usize) -> Vec<Metric> {
        let mut seen: Vec<Metric> = self
            .records
            .iter()
            .filter(|r| r.variant == variant)
            .flat_map(|r| r.metrics.keys().cloned())
            .collect();
        seen.sort();
        seen.dedup();
        seen
    }
}

/// Per-trial customization points for [`Schedule::execute`].
pub trait TrialHooks {
    /// Environment for the trial about to run.
    fn environment(&mut self, variant: &Variant, slot: &Slot) -> Result<TrialEnv>;

    /// Turn a successful run into a record. The default keeps wall time only.
    fn collect(
        &mut self,
        _variant: &Variant,
        slot: &Slot,
        output: &TrialOutput,
        _log: &mut TrialLog,
    ) -> Result<TrialRecord> {
        Ok(TrialRecord::timed(slot, output))
    }

    /// Called once the record has been appended.
    fn completed(&mut self, _variant: &Variant, _slot: &Slot, _record: &TrialRecord) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    order: Vec<usize>,
    trials: u32,
}

impl Schedule {
    /// `trials` entries per variant, uniformly shuffled.
    pub fn shuffled<R: Rng + ?Sized>(variant_count: usize, trials: u32, rng: &mut R) -> Result<Self> {
        if trials < 1 {
            return Err(BenchError::config("TRIALS must be >= 1"));
        }
        if variant_count == 0 {
            return Err(BenchError::config("no variants configured"));
        }
        let mut order: Vec<usize> = (0..variant_count)
            .flat_map(|v| std::iter::repeat(v).take(trials as usize))
            .collect();
        order.shuffle(rng);
        Ok(Self { order, trials })
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn trials(&self) -> u32 {
        self.trials
    }

    /// Run every slot in order. Stops at the first failure; trials completed
    /// before it stay in `log`.
    pub fn execute<R, H>(
        &self,
        variants: &[Variant],
        runner: &mut R,
        hooks: &mut H,
        log: &mut TrialLog,
    ) -> Result<()>
    where
        R: TrialRunner + ?Sized,
        H: TrialHooks + ?Sized,
    {
        let total = self.order.len();
        let mut repetitions = vec![0u32; variants.len()];

        for (i, &v) in self.order.iter().enumerate() {
            let variant = variants.get(v).ok_or_else(|| {
                BenchError::config(format!("schedule refers to unknown variant #{v}"))
            })?;
            repetitions[v] += 1;
            let slot = Slot {
                index: i + 1,
                total,
                variant: v,
                repetition: repetitions[v],
            };

            let env = hooks.environment(variant, &slot)?;
            let output = run_checked(runner, variant, &env)?;
            let record = hooks.collect(variant, &slot, &output, log)?;
            log.push(record);
            if let Some(record) = log.records().last() {
                hooks.completed(variant, &slot, record)?;
            }
        }
        Ok(())
    }
}
