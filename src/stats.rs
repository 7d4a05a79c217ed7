//! Descriptive statistics over one sample series.
//!
//! Pure function of its input: nothing is cached or updated incrementally.
//! Quartiles use the inclusive method (position `p * (n - 1)` over the
//! sorted samples, linearly interpolated), so `min <= q1 <= median <= q3 <= max`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1 denominator); 0 for a single sample.
    pub std_dev: f64,
    pub q1: f64,
    pub q3: f64,
    pub min: f64,
    pub max: f64,
}

/// Inclusive quantile of already sorted, non-empty samples.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

impl Summary {
    /// `None` only for an empty slice.
    pub fn from_samples(samples: &[f64]) -> Option<Summary> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = median_sorted(&sorted);

        let (std_dev, q1, q3) = if n == 1 {
            (0.0, median, median)
        } else {
            let variance =
                sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            (
                variance.sqrt(),
                quantile_sorted(&sorted, 0.25),
                quantile_sorted(&sorted, 0.75),
            )
        };

        Some(Summary {
            n,
            mean,
            median,
            std_dev,
            q1,
            q3,
            min: sorted[0],
            max: sorted[n - 1],
        })
    }

    pub fn from_counts(counts: &[u64]) -> Option<Summary> {
        let samples: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
        Summary::from_samples(&samples)
    }

    /// One-line form used in console summaries.
    pub fn describe(&self, unit: &str) -> String {
        format!(
            "n={} mean={:.3}{u} median={:.3}{u} stddev={:.3}{u} p25={:.3}{u} p75={:.3}{u} min={:.3}{u} max={:.3}{u}",
            self.n,
            self.mean,
            self.median,
            self.std_dev,
            self.q1,
            self.q3,
            self.min,
            self.max,
            u = unit,
        )
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

/// Mean of possibly empty samples; 0 when there are none.
pub fn mean_or_zero(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Sample standard deviation of possibly tiny samples; 0 below two samples.
pub fn std_dev_or_zero(samples: &[f64]) -> f64 {
    Summary::from_samples(samples).map_or(0.0, |s| s.std_dev)
}
