//! Benchmarks for graph search.
//!
//! Run with: `cargo bench --bench search_bench`
//!
//! # Reproducibility
//!
//! All benchmarks use:
//! - Seed: 42 for RNG
//! - Dimensions: 64
//! - Distribution: Uniform [-1, 1]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use diskvec::{
    Bits, BuilderParams, DenseVectorValues, GraphBuilder, GraphSearcher, OnHeapGraph,
    ProductQuantizer, ScoreProvider, Similarity,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

const DIMS: usize = 64;

fn generate_vectors(count: usize, seed: u64) -> DenseVectorValues {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut v = DenseVectorValues::new(DIMS);
    for _ in 0..count {
        let row: Vec<f32> = (0..DIMS).map(|_| rng.gen_range(-1.0..1.0)).collect();
        v.push(&row).expect("fixed dimension");
    }
    v
}

fn build_graph(vectors: &DenseVectorValues) -> OnHeapGraph {
    let params = BuilderParams {
        max_degree: 16,
        beam_width: 100,
        ..BuilderParams::default()
    };
    let (builder, _) =
        GraphBuilder::build(vectors, Similarity::Euclidean, params).expect("build succeeds");
    builder.into_graph()
}

fn bench_exact_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("exact_search");
    for count in [1_000usize, 10_000] {
        let vectors = generate_vectors(count, 42);
        let graph = build_graph(&vectors);
        let query: Vec<f32> = (0..DIMS).map(|i| (i as f32 * 0.1).sin()).collect();
        let provider = ScoreProvider::exact(&query, Similarity::Euclidean, graph.vectors())
            .expect("query dimension matches");
        let mut searcher = GraphSearcher::new();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |bencher, _| {
            bencher.iter(|| {
                searcher
                    .search(black_box(&graph), &provider, 10, 50, Bits::All)
                    .expect("search succeeds")
            });
        });
    }
    group.finish();
}

fn bench_quantized_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantized_search");
    for count in [1_000usize, 10_000] {
        let vectors = generate_vectors(count, 42);
        let graph = build_graph(&vectors);
        let pq = ProductQuantizer::train(&vectors, 16, 256, true, 42).expect("training succeeds");
        let codes = pq.encode_all(&vectors).expect("encoding succeeds");
        let query: Vec<f32> = (0..DIMS).map(|i| (i as f32 * 0.1).sin()).collect();
        let table = pq
            .score_table(&query, Similarity::Euclidean)
            .expect("query dimension matches");
        let provider = ScoreProvider::quantized(
            table,
            &codes,
            pq.subspace_count(),
            Similarity::Euclidean,
            &query,
            Some(graph.vectors()),
        );
        let mut searcher = GraphSearcher::new();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |bencher, _| {
            bencher.iter(|| {
                searcher
                    .search(black_box(&graph), &provider, 10, 50, Bits::All)
                    .expect("search succeeds")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_exact_search, bench_quantized_search);
criterion_main!(benches);
