use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndstore::{decompose, DimSelector, Selection};
use std::hint::black_box;

fn decompose_ranges(c: &mut Criterion) {
    let shape = [4096u64, 4096, 2048];
    let chunk_shape = [64u64, 64, 64];
    let mut group = c.benchmark_group("decompose_ranges");

    for extent in [256u64, 1024, 4096] {
        let selection = Selection::ranges(&[0..extent, 0..extent, 0..extent.min(2048)]);
        let chunks = (extent / 64) * (extent / 64) * (extent.min(2048) / 64);
        group.throughput(Throughput::Elements(chunks));
        group.bench_function(BenchmarkId::new("count", extent), |b| {
            b.iter(|| {
                decompose(black_box(&selection), &shape, &chunk_shape)
                    .unwrap()
                    .count()
            });
        });
    }
    group.finish();
}

fn decompose_points(c: &mut Criterion) {
    let shape = [10_000u64, 10_000];
    let chunk_shape = [100u64, 100];
    let mut group = c.benchmark_group("decompose_points");

    for n in [1_000i64, 10_000] {
        let rows: Vec<i64> = (0..n).map(|i| (i * 7919) % 10_000).collect();
        let cols: Vec<i64> = (0..n).map(|i| (i * 104_729) % 10_000).collect();
        let vectorized = Selection::Vectorized(vec![rows.clone(), cols.clone()]);
        let outer = Selection::Outer(vec![
            DimSelector::Indices(rows[..100].to_vec()),
            DimSelector::Indices(cols[..100].to_vec()),
        ]);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(BenchmarkId::new("vectorized", n), |b| {
            b.iter(|| {
                decompose(black_box(&vectorized), &shape, &chunk_shape)
                    .unwrap()
                    .count()
            });
        });
        group.bench_function(BenchmarkId::new("outer_indices", n), |b| {
            b.iter(|| {
                decompose(black_box(&outer), &shape, &chunk_shape)
                    .unwrap()
                    .count()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, decompose_ranges, decompose_points);
criterion_main!(benches);
