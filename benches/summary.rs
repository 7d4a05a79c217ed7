//! Aggregation benchmarks
//!
//! - Summary statistics over sample series of increasing size
//! - Pooling of per-variant series into Markdown rows

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use elide_bench::harness::TrialCommand;
use elide_bench::metrics::Metric;
use elide_bench::report::pooled_rows;
use elide_bench::schedule::{TrialLog, TrialRecord, Variant};
use elide_bench::stats::Summary;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn samples(n: usize) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    (0..n).map(|_| rng.gen_range(0.5..2.5)).collect()
}

fn bench_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("summary");
    for n in [10usize, 108, 10_000] {
        let xs = samples(n);
        group.bench_with_input(BenchmarkId::new("from_samples", n), &xs, |b, xs| {
            b.iter(|| Summary::from_samples(black_box(xs)))
        });
    }
    group.finish();
}

fn bench_pooled_rows(c: &mut Criterion) {
    let variants: Vec<Variant> = ["sim1", "sim2", "sweep", "sim1_elided", "sim2_elided", "sweep_elided"]
        .iter()
        .map(|name| {
            let mut v = Variant::new(*name, TrialCommand::new(format!("{name}.sh")));
            v.benchmark = Some(if name.starts_with("sweep") { "sweep" } else { "track_and_hold" }.to_string());
            v.variation = Some(if name.ends_with("elided") { "elided" } else { "unelided" }.to_string());
            v
        })
        .collect();

    let mut log = TrialLog::new();
    for (i, elapsed) in samples(6 * 108).into_iter().enumerate() {
        log.push(TrialRecord {
            index: i + 1,
            variant: i % variants.len(),
            elapsed,
            metrics: [(Metric::WallTime, elapsed)].into_iter().collect(),
        });
    }

    c.bench_function("pooled_rows/648_trials", |b| {
        b.iter(|| pooled_rows(black_box(&variants), black_box(&log)))
    });
}

criterion_group!(benches, bench_summary, bench_pooled_rows);
criterion_main!(benches);
