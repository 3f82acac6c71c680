//! Benchmarks for mosaic assembly and point sampling.
//!
//! Run with: cargo bench --package embedding-store --bench sampling_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};

use embedding_store::{EmbeddingMosaic, EmbeddingTile, MosaicBuilder, QuantizedTile};
use geo_common::{generate_grid, BoundingBox, GeoTransform, GridCellKey, SamplePoint};

const CHANNELS: usize = 64;

fn random_mosaic(size: usize) -> EmbeddingMosaic {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let data = (0..size * size * CHANNELS)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    let transform = GeoTransform::from_bounds(0.0, 52.0, 0.3, 52.3, size, size);
    EmbeddingMosaic::new([size, size, CHANNELS], data, transform).unwrap()
}

fn random_points(n: usize) -> Vec<SamplePoint> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    (0..n)
        .map(|_| SamplePoint::new(rng.gen_range(-0.05..0.35), rng.gen_range(51.95..52.35)))
        .collect()
}

// =============================================================================
// SAMPLING
// =============================================================================

fn bench_sample_at_points(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_at_points");
    let mosaic = random_mosaic(300);

    for n in [100, 1_000, 10_000] {
        let points = random_points(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| black_box(mosaic.sample_at_points(points)));
        });
    }

    group.finish();
}

fn bench_grid_sampling(c: &mut Criterion) {
    let mosaic = random_mosaic(300);
    let bbox = BoundingBox::new(0.03, 52.03, 0.27, 52.27);

    c.bench_function("generate_and_sample_grid_0.005", |b| {
        b.iter(|| {
            let points = generate_grid(&bbox, 0.005).unwrap();
            black_box(mosaic.sample_at_points(&points))
        });
    });
}

// =============================================================================
// ASSEMBLY
// =============================================================================

fn bench_grid_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_grid_tiles");

    for n in [2usize, 3, 5] {
        let tiles: Vec<EmbeddingTile> = (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .map(|(i, j)| {
                let key = GridCellKey::new(0.05 + i as f64 * 0.1, 52.05 + j as f64 * 0.1);
                EmbeddingTile::new(key, [100, 100, CHANNELS], vec![0.5; 100 * 100 * CHANNELS])
            })
            .collect();
        let bbox = BoundingBox::new(0.05, 52.05, 0.05 + n as f64 * 0.1, 52.05 + n as f64 * 0.1);

        group.bench_with_input(BenchmarkId::new("tiles", n * n), &tiles, |b, tiles| {
            b.iter(|| {
                black_box(MosaicBuilder::from_grid_tiles(tiles.clone(), 0.1, &bbox, 2024).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_dequantize(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let values: Vec<f32> = (0..100 * 100 * CHANNELS)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    let tile = QuantizedTile::quantize([100, 100, CHANNELS], &values).unwrap();

    c.bench_function("dequantize_100x100x64", |b| {
        b.iter(|| black_box(tile.dequantize()));
    });
}

criterion_group!(
    benches,
    bench_sample_at_points,
    bench_grid_sampling,
    bench_grid_assembly,
    bench_dequantize
);
criterion_main!(benches);
