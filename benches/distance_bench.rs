//! Benchmarks for the scalar similarity kernels.
//!
//! Run with: `cargo bench --bench distance_bench`
//!
//! # Reproducibility
//!
//! All benchmarks use:
//! - Seed: 42 for RNG
//! - Dimensions: 128, 384, 768, 1536
//! - Distribution: Uniform [-1, 1]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use diskvec::metric::scalar;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

/// Generates deterministic test vectors.
fn generate_vectors(count: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn bench_dot(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot");
    for dims in [128, 384, 768, 1536] {
        let vectors = generate_vectors(2, dims, 42);
        let (a, b) = (&vectors[0], &vectors[1]);
        group.throughput(Throughput::Elements(dims as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dims), &dims, |bencher, _| {
            bencher.iter(|| scalar::dot(black_box(a), black_box(b)));
        });
    }
    group.finish();
}

fn bench_square_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("square_distance");
    for dims in [128, 384, 768, 1536] {
        let vectors = generate_vectors(2, dims, 42);
        let (a, b) = (&vectors[0], &vectors[1]);
        group.throughput(Throughput::Elements(dims as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dims), &dims, |bencher, _| {
            bencher.iter(|| scalar::square_distance(black_box(a), black_box(b)));
        });
    }
    group.finish();
}

fn bench_cosine(c: &mut Criterion) {
    let mut group = c.benchmark_group("cosine");
    for dims in [128, 384, 768, 1536] {
        let vectors = generate_vectors(2, dims, 42);
        let (a, b) = (&vectors[0], &vectors[1]);
        group.throughput(Throughput::Elements(dims as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dims), &dims, |bencher, _| {
            bencher.iter(|| scalar::cosine(black_box(a), black_box(b)));
        });
    }
    group.finish();
}

fn bench_assemble_and_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_and_sum");
    for subspaces in [8usize, 16, 32, 64] {
        let clusters = 256;
        let table = generate_vectors(1, subspaces * clusters, 42).remove(0);
        let mut rng = ChaCha8Rng::seed_from_u64(43);
        let codes: Vec<u8> = (0..subspaces).map(|_| rng.gen()).collect();
        group.throughput(Throughput::Elements(subspaces as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subspaces),
            &subspaces,
            |bencher, _| {
                bencher.iter(|| {
                    scalar::assemble_and_sum(black_box(&table), clusters, black_box(&codes))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_dot,
    bench_square_distance,
    bench_cosine,
    bench_assemble_and_sum
);
criterion_main!(benches);
