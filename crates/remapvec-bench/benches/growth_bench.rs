//! Growth benchmarks: push loops and reserve ladders against `std::vec::Vec`.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use remapvec::{Backend, GrowthPolicy, Vector};

fn bench_push(c: &mut Criterion) {
    let counts: &[usize] = &[1_000, 100_000, 1_000_000];
    let mut group = c.benchmark_group("push_u64");

    for &count in counts {
        group.bench_with_input(BenchmarkId::new("std_vec", count), &count, |b, &n| {
            b.iter(|| {
                let mut v = Vec::new();
                for i in 0..n as u64 {
                    v.push(i);
                }
                criterion::black_box(v);
            });
        });
        group.bench_with_input(BenchmarkId::new("remap", count), &count, |b, &n| {
            b.iter(|| {
                let mut v: Vector<u64> = Vector::with_policy(GrowthPolicy::default());
                for i in 0..n as u64 {
                    v.push(i);
                }
                criterion::black_box(v);
            });
        });
        group.bench_with_input(BenchmarkId::new("heap_only", count), &count, |b, &n| {
            let policy = GrowthPolicy::default().with_backend(Backend::HeapOnly);
            b.iter(|| {
                let mut v: Vector<u64> = Vector::with_policy(policy);
                for i in 0..n as u64 {
                    v.push(i);
                }
                criterion::black_box(v);
            });
        });
    }
    group.finish();
}

fn bench_reserve_ladder(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_ladder");
    group.sample_size(20);

    group.bench_function("std_vec_64MiB", |b| {
        b.iter(|| {
            let mut v: Vec<u64> = Vec::with_capacity(1024);
            v.extend(0..1024u64);
            for step in 1..=8usize {
                v.reserve_exact((step << 20) - v.len());
                v.push(step as u64);
            }
            criterion::black_box(v);
        });
    });

    group.bench_function("remap_64MiB", |b| {
        b.iter(|| {
            let mut v: Vector<u64> = Vector::with_policy(GrowthPolicy::default());
            v.extend(0..1024u64);
            for step in 1..=8usize {
                v.reserve_exact((step << 20) - v.len());
                v.push(step as u64);
            }
            criterion::black_box(v);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_push, bench_reserve_ladder);
criterion_main!(benches);
