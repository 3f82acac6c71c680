//! End-to-end scoring: fixture tiles on disk, mosaic loading, background
//! sampling, training and both scoring modes.

use std::sync::Arc;

use embedding_store::{read_float_pages, EmbeddingMosaic, MosaicConfig, MosaicLoader, TileStore};
use geo_common::{BoundingBox, SamplePoint};
use scoring::{
    sample_background, sample_occurrences, subsample_candidates, FeatureCollection,
    LogisticRegression, ProbabilityModel, ScoringConfig, ScoringEngine, ScoringError,
    TrainingSet,
};
use test_utils::{random_points_in, split_habitat_tile, TileCacheFixture};

const SHAPE: [usize; 3] = [10, 10, 4];

/// Two side-by-side tiles; in each, the western half carries the habitat
/// signature on channel 0.
fn habitat_mosaic(cache: &TileCacheFixture) -> Arc<EmbeddingMosaic> {
    let values = split_habitat_tile(SHAPE, 5);
    cache.write_tile(0.05, 52.05, SHAPE, &values);
    cache.write_tile(0.15, 52.05, SHAPE, &values);

    let store = TileStore::new(cache.store_config()).unwrap();
    let loader = MosaicLoader::new(store, MosaicConfig::default()).unwrap();
    let bbox = BoundingBox::new(0.05, 52.05, 0.25, 52.15);
    loader.load(&bbox, cache.year(), None).unwrap().mosaic
}

/// Occurrences scattered over the western half of each tile.
fn occurrences() -> Vec<SamplePoint> {
    let mut points = random_points_in((0.051, 52.051, 0.099, 52.149), 10, 1);
    points.extend(random_points_in((0.151, 52.051, 0.199, 52.149), 10, 2));
    points.into_iter().map(SamplePoint::from).collect()
}

fn mean_by_half(values: &[f32], width: usize) -> (f32, f32) {
    let (mut west, mut east) = (Vec::new(), Vec::new());
    for (i, v) in values.iter().enumerate() {
        if (i % width) % 10 < 5 {
            west.push(*v);
        } else {
            east.push(*v);
        }
    }
    let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
    (mean(&west), mean(&east))
}

fn trained(
    engine: &ScoringEngine,
    mosaic: &EmbeddingMosaic,
) -> impl ProbabilityModel {
    let positives = sample_occurrences(mosaic, &occurrences());
    assert_eq!(positives.len(), 20);

    let n_background = positives.len() * engine.config().negative_ratio;
    let background = sample_background(mosaic, n_background, &positives.coords, engine.config().seed);
    assert_eq!(background.len(), n_background);

    let set = TrainingSet::from_embeddings(positives.embeddings, background.embeddings).unwrap();
    engine.train(&LogisticRegression::default(), &set).unwrap()
}

#[test]
fn test_dense_scoring_prefers_habitat() {
    let cache = TileCacheFixture::new(2024);
    let mosaic = habitat_mosaic(&cache);
    assert_eq!(mosaic.shape(), [10, 20, 4]);

    let engine = ScoringEngine::new(ScoringConfig {
        batch_size: 7,
        ..Default::default()
    })
    .unwrap();
    let model = trained(&engine, &mosaic);
    let surface = engine.score_mosaic(&model, &mosaic).unwrap();

    assert_eq!(surface.shape(), [10, 20]);
    assert!(surface.values().iter().all(|p| (0.0..=1.0).contains(p)));

    let (west, east) = mean_by_half(surface.values(), surface.width());
    assert!(west > east, "west {} should outscore east {}", west, east);

    let candidates = surface.candidates(0.0);
    assert_eq!(candidates.len(), 200);
    assert!(candidates
        .windows(2)
        .all(|w| w[0].probability <= w[1].probability));
    let best = candidates.last().unwrap();
    let (_, col) = mosaic.pixel_index(best.lon, best.lat).unwrap();
    assert!(col % 10 < 5, "best candidate in column {}", col);
}

#[test]
fn test_chunking_does_not_change_scores() {
    let cache = TileCacheFixture::new(2024);
    let mosaic = habitat_mosaic(&cache);

    let small = ScoringEngine::new(ScoringConfig {
        batch_size: 3,
        ..Default::default()
    })
    .unwrap();
    let large = ScoringEngine::new(ScoringConfig::default()).unwrap();

    let model = trained(&large, &mosaic);
    let a = small.score_mosaic(&model, &mosaic).unwrap();
    let b = large.score_mosaic(&model, &mosaic).unwrap();
    assert_eq!(a.values(), b.values());
}

#[test]
fn test_grid_scoring_over_partial_coverage() {
    let cache = TileCacheFixture::new(2024);
    let mosaic = habitat_mosaic(&cache);
    let engine = ScoringEngine::new(ScoringConfig::default()).unwrap();
    let model = trained(&engine, &mosaic);

    // Grid points sit mid-pixel; the top five rows lie north of the mosaic.
    let bbox = BoundingBox::new(0.055, 52.055, 0.255, 52.205);
    let scores = engine.score_grid(&model, &mosaic, &bbox, 0.01, 0.5).unwrap();

    assert_eq!(scores.surface.shape(), [15, 20]);
    assert_eq!(scores.total_points, 300);
    assert_eq!(scores.valid_points, 200);

    let nan_rows = scores
        .surface
        .values()
        .chunks(20)
        .filter(|row| row.iter().all(|v| v.is_nan()))
        .count();
    assert_eq!(nan_rows, 5);
    assert!(scores
        .candidates
        .iter()
        .all(|c| c.lat < 52.15 && c.probability >= 0.5));
}

#[test]
fn test_outputs_written() {
    let cache = TileCacheFixture::new(2024);
    let mosaic = habitat_mosaic(&cache);
    let engine = ScoringEngine::new(ScoringConfig::default()).unwrap();
    let model = trained(&engine, &mosaic);
    let surface = engine.score_mosaic(&model, &mosaic).unwrap();

    let out = tempfile::tempdir().unwrap();
    let tif = out.path().join("probability.tif");
    surface.write_tiff(&tif).unwrap();
    let raster = read_float_pages(&tif).unwrap();
    assert_eq!((raster.width, raster.height), (20, 10));
    assert_eq!(raster.bands[0], surface.values());
    assert!(raster.transform.approx_eq(surface.transform(), 1e-9));

    let candidates = subsample_candidates(&surface.candidates(0.5), 5, 42);
    assert!(candidates.len() <= 5);
    let geojson = out.path().join("candidates.geojson");
    FeatureCollection::from_candidates(&candidates)
        .write_to(&geojson, false)
        .unwrap();
    let text = std::fs::read_to_string(&geojson).unwrap();
    let back: FeatureCollection = serde_json::from_str(&text).unwrap();
    assert_eq!(back.len(), candidates.len());
}

#[test]
fn test_single_valid_occurrence_cannot_train() {
    let cache = TileCacheFixture::new(2024);
    let mosaic = habitat_mosaic(&cache);
    let engine = ScoringEngine::new(ScoringConfig::default()).unwrap();

    let occurrences = [SamplePoint::new(0.07, 52.07), SamplePoint::new(3.0, 40.0)];
    let positives = sample_occurrences(&mosaic, &occurrences);
    assert_eq!(positives.len(), 1);

    let background = sample_background(&mosaic, 5, &positives.coords, 42);
    let set = TrainingSet::from_embeddings(positives.embeddings, background.embeddings).unwrap();
    let err = engine
        .train(&LogisticRegression::default(), &set)
        .unwrap_err();
    assert!(matches!(
        err,
        ScoringError::InsufficientTrainingData {
            positive: 1,
            negative: 5
        }
    ));
}
