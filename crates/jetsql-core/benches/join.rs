//! Join execution benchmarks.
//!
//! Compares hash-probe and full-scan execution at different cardinalities,
//! and keyed lookups against a partitioned map.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jetsql_core::{
    CancellationToken, ExprEvaluator, JoinClassifier, JoinConfig, JoinStage, MemoryRelation,
    PartitionedMap, RightRelation,
};
use jetsql_proto::{row, Expr, Row};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_rows(rng: &mut StdRng, count: usize, domain: i64) -> Vec<Row> {
    (0..count)
        .map(|i| row![rng.gen_range(0..domain), i as i64])
        .collect()
}

fn stage(condition: Expr, right: RightRelation) -> JoinStage {
    let descriptor = JoinClassifier::classify(condition, 2, 2).unwrap();
    JoinStage::new(
        Arc::new(descriptor),
        right,
        Arc::new(ExprEvaluator::new()),
        JoinConfig::default(),
    )
    .unwrap()
}

fn run(stage: &JoinStage, left: &[Row]) -> usize {
    stage
        .execute(left.iter().cloned().map(Ok), &CancellationToken::new())
        .unwrap()
        .len()
}

fn bench_hash_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("join/hash_probe");
    let mut rng = StdRng::seed_from_u64(42);

    for size in [100, 1_000, 10_000] {
        let left = random_rows(&mut rng, size, size as i64);
        let right = MemoryRelation::new("r", 2, random_rows(&mut rng, size, size as i64)).unwrap();
        let stage = stage(
            Expr::eq(Expr::col(0), Expr::col(2)),
            RightRelation::Bounded(Arc::new(right)),
        );

        group.bench_with_input(BenchmarkId::new("rows", size), &left, |b, left| {
            b.iter(|| black_box(run(&stage, left)));
        });
    }

    group.finish();
}

fn bench_full_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("join/full_scan");
    let mut rng = StdRng::seed_from_u64(42);

    // Quadratic; keep sizes small
    for size in [100, 500, 1_000] {
        let left = random_rows(&mut rng, size, size as i64);
        let right = MemoryRelation::new("r", 2, random_rows(&mut rng, size, size as i64)).unwrap();
        // Same matches as the hash probe, but hidden from the classifier.
        let condition = Expr::eq(
            Expr::add(Expr::col(0), Expr::lit(0i64)),
            Expr::col(2),
        );
        let stage = stage(condition, RightRelation::Bounded(Arc::new(right)));

        group.bench_with_input(BenchmarkId::new("rows", size), &left, |b, left| {
            b.iter(|| black_box(run(&stage, left)));
        });
    }

    group.finish();
}

fn bench_keyed_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("join/keyed_lookup");
    let mut rng = StdRng::seed_from_u64(42);

    for size in [1_000, 10_000] {
        let map = PartitionedMap::new("m", 2, vec![0], 16).unwrap();
        map.insert_all((0..size as i64).map(|k| row![k, k * 2]))
            .unwrap();
        let left = random_rows(&mut rng, size, size as i64 * 2);
        let stage = stage(
            Expr::eq(Expr::col(0), Expr::col(2)),
            RightRelation::Partitioned(Arc::new(map)),
        );

        group.bench_with_input(BenchmarkId::new("rows", size), &left, |b, left| {
            b.iter(|| black_box(run(&stage, left)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hash_probe, bench_full_scan, bench_keyed_lookup);
criterion_main!(benches);
