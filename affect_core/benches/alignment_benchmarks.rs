//! Aligner and ensemble throughput
//!
//! Run with: cargo bench --bench alignment_benchmarks

use affect_core::adapt::{CoralAligner, DomainAligner, EnsembleAligner, SubspaceAligner};
use affect_core::models::{BinaryClassifier, ForestConfig, RandomForest};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn domain(n: usize, d: usize, shift: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, d), |_| shift + rng.gen_range(-1.0..1.0))
}

fn bench_aligners(c: &mut Criterion) {
    let mut group = c.benchmark_group("align");

    for d in [8, 32, 64] {
        let source = domain(400, d, 0.0, 1);
        let target = domain(300, d, 2.0, 2);

        group.bench_with_input(BenchmarkId::new("coral", d), &d, |b, _| {
            let aligner = CoralAligner::default();
            b.iter(|| black_box(aligner.align(source.view(), target.view())));
        });
        group.bench_with_input(BenchmarkId::new("subspace", d), &d, |b, _| {
            let aligner = SubspaceAligner::default();
            b.iter(|| black_box(aligner.align(source.view(), target.view())));
        });
        group.bench_with_input(BenchmarkId::new("ensemble", d), &d, |b, _| {
            let aligner = EnsembleAligner::default();
            b.iter(|| black_box(aligner.align(source.view(), target.view())));
        });
    }

    group.finish();
}

fn bench_forest_fit(c: &mut Criterion) {
    let x = domain(300, 16, 0.0, 3);
    let y: Vec<usize> = (0..300).map(|i| usize::from(x[[i, 0]] + x[[i, 1]] > 0.0)).collect();

    c.bench_function("forest_fit_50_trees", |b| {
        b.iter(|| {
            let mut forest = RandomForest::new(ForestConfig::quick(50), 42);
            forest.fit(x.view(), &y, None);
            black_box(forest.n_trees())
        });
    });
}

criterion_group!(benches, bench_aligners, bench_forest_fit);
criterion_main!(benches);
