//! Benchmarks for coalescing
//!
//! Measures the per-frame dedupe cost for bursty tick streams.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tick_feed::core::{Marker, TickEvent};
use tick_feed::hot_path::{coalesce, dedupe_markers};

fn burst(len: usize, symbols: usize) -> Vec<TickEvent> {
    (0..len)
        .map(|i| TickEvent::new(format!("SYM{}", i % symbols), 1, i as f32, 1.0, 0.0, 0.0))
        .collect()
}

fn bench_coalesce(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalesce");

    for (len, symbols) in [(100usize, 1usize), (1000, 10), (1000, 500)] {
        let input = burst(len, symbols);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(
            BenchmarkId::new("ticks", format!("{len}x{symbols}")),
            &input,
            |b, input| b.iter(|| black_box(coalesce(black_box(input.clone())))),
        );
    }

    group.finish();
}

fn bench_markers(c: &mut Criterion) {
    let markers: Vec<Marker> = (0..500u32)
        .map(|i| Marker::new((i * 7919) % 200, format!("m{}", i % 50)))
        .collect();

    let mut group = c.benchmark_group("markers");
    group.throughput(Throughput::Elements(markers.len() as u64));
    group.bench_function("dedupe_sort_500", |b| {
        b.iter(|| black_box(dedupe_markers(black_box(markers.clone()))))
    });
    group.finish();
}

criterion_group!(benches, bench_coalesce, bench_markers);
criterion_main!(benches);
