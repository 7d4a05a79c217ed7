//! Trial log parsing benchmarks
//!
//! Counter tables and key-value logs as left behind by perf-wrapped trial scripts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use elide_bench::logs::{parse_counter_table, parse_key_values};
use elide_bench::metrics::ProbeSet;

fn counter_table(probe_events: usize) -> String {
    let mut text = String::from("# started on Sun Feb 22 10:00:00 2026\n\n");
    text.push_str("1234.56,msec,task-clock,1234560000,100.00,1.000,CPUs utilized\n");
    text.push_str("4,567,890,,cycles,1234560000,100.00,3.700,GHz\n");
    text.push_str("<not counted>,,cache-misses,0,0.00,,\n");
    text.push_str("12,,context-switches,1234560000,100.00,9.720,/sec\n");
    for i in 0..probe_events {
        text.push_str(&format!("1,{:03},,osdi:eval_{i},1234560000,100.00,,\n", i % 1000));
    }
    text
}

fn kv_log(events: usize) -> String {
    let names: Vec<String> = (0..events).map(|i| format!("eval_{i}")).collect();
    format!(
        "OSDI_FILE_OPENS=2\nOSDI_PROBE_GROUP=osdi\nOSDI_PROBE_EVENTS={}\n",
        names.join(",")
    )
}

fn bench_counter_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_table");
    for events in [3usize, 64, 1024] {
        let text = counter_table(events);
        group.bench_with_input(BenchmarkId::new("parse", events), &text, |b, text| {
            b.iter(|| parse_counter_table(black_box(text)))
        });
    }
    group.finish();
}

fn bench_correlate(c: &mut Criterion) {
    let table = parse_counter_table(&counter_table(64));
    let probes = ProbeSet::from_log(&parse_key_values(&kv_log(64)));
    c.bench_function("correlate/64_probes", |b| {
        b.iter(|| black_box(&probes).correlate(black_box(&table)).runtime_calls())
    });
}

criterion_group!(benches, bench_counter_table, bench_correlate);
criterion_main!(benches);
