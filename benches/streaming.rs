// Streaming Algorithm Benchmarks
// Hot paths: per-iteration add() across the family, partial-result merges,
// and GraphZipper compression throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use loadstats::{
    GraphZipper, MeanComputation, PercentileComputation, StdDevComputation, StreamingAlgorithm,
};

fn durations(count: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count).map(|_| rng.gen_range(0.001..10.0)).collect()
}

fn bench_add(c: &mut Criterion) {
    let values = durations(10_000);

    c.bench_function("mean_add_10k", |b| {
        b.iter(|| {
            let mut mean = MeanComputation::new();
            for &value in &values {
                mean.add(black_box(value)).unwrap();
            }
            black_box(mean.result())
        })
    });

    c.bench_function("stddev_add_10k", |b| {
        b.iter(|| {
            let mut stddev = StdDevComputation::new();
            for &value in &values {
                stddev.add(black_box(value)).unwrap();
            }
            black_box(stddev.result())
        })
    });
}

fn bench_merge(c: &mut Criterion) {
    let values = durations(10_000);
    let shards: Vec<StdDevComputation> = values
        .chunks(100)
        .map(|chunk| {
            let mut shard = StdDevComputation::new();
            for &value in chunk {
                shard.add(value).unwrap();
            }
            shard
        })
        .collect();

    c.bench_function("stddev_merge_100_shards", |b| {
        b.iter(|| {
            let mut reduced = StdDevComputation::new();
            for shard in &shards {
                reduced.merge(black_box(shard)).unwrap();
            }
            black_box(reduced.result())
        })
    });
}

fn bench_zipper(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_zipper");
    for base_size in [1_000usize, 100_000] {
        let values = durations(base_size);
        group.bench_with_input(
            BenchmarkId::new("compress_to_1000", base_size),
            &values,
            |b, values| {
                b.iter(|| {
                    let mut zipper = GraphZipper::new(values.len(), 1000).unwrap();
                    for &value in values {
                        zipper.add_point(black_box(value)).unwrap();
                    }
                    black_box(zipper.get_zipped_graph().len())
                })
            },
        );
    }
    group.finish();
}

fn bench_percentile(c: &mut Criterion) {
    let values = durations(100_000);
    c.bench_function("percentile_p95_100k", |b| {
        b.iter(|| {
            let mut percentile = PercentileComputation::new(0.95, values.len()).unwrap();
            for &value in &values {
                percentile.add(black_box(value)).unwrap();
            }
            black_box(percentile.result())
        })
    });
}

criterion_group!(benches, bench_add, bench_merge, bench_zipper, bench_percentile);
criterion_main!(benches);
