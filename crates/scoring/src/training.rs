//! Training data: labelled embeddings and background sampling.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use embedding_store::EmbeddingMosaic;
use geo_common::{BoundingBox, SamplePoint};

use crate::error::{Result, ScoringError};

/// Random draws allowed per requested background pixel.
pub const BACKGROUND_ATTEMPTS_PER_SAMPLE: usize = 20;

/// Random draws allowed per requested negative point.
pub const NEGATIVE_ATTEMPTS_PER_SAMPLE: usize = 100;

/// Default exclusion radius around positives, in degrees (~500 m).
pub const DEFAULT_MIN_DISTANCE: f64 = 0.005;

/// Minimum examples per class before a fit is attempted.
pub const MIN_EXAMPLES_PER_CLASS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Known occurrence.
    Presence,
    /// Background or pseudo-absence.
    Background,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub embedding: Vec<f32>,
    pub label: Label,
}

/// Labelled embeddings sharing one feature width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    examples: Vec<TrainingExample>,
    n_features: Option<usize>,
}

impl TrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from positive and negative embeddings.
    pub fn from_embeddings<P, N>(positive: P, negative: N) -> Result<Self>
    where
        P: IntoIterator<Item = Vec<f32>>,
        N: IntoIterator<Item = Vec<f32>>,
    {
        let mut set = Self::new();
        for embedding in positive {
            set.push(TrainingExample {
                embedding,
                label: Label::Presence,
            })?;
        }
        for embedding in negative {
            set.push(TrainingExample {
                embedding,
                label: Label::Background,
            })?;
        }
        Ok(set)
    }

    /// Add an example; its width must match the examples already present.
    pub fn push(&mut self, example: TrainingExample) -> Result<()> {
        match self.n_features {
            Some(expected) if expected != example.embedding.len() => {
                return Err(ScoringError::dimension_mismatch(
                    expected,
                    example.embedding.len(),
                ));
            }
            None => self.n_features = Some(example.embedding.len()),
            _ => {}
        }
        self.examples.push(example);
        Ok(())
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    pub fn n_positive(&self) -> usize {
        self.count(Label::Presence)
    }

    pub fn n_negative(&self) -> usize {
        self.count(Label::Background)
    }

    fn count(&self, label: Label) -> usize {
        self.examples.iter().filter(|e| e.label == label).count()
    }

    /// Fails with `InsufficientTrainingData` unless both classes have at
    /// least two examples.
    pub fn validate(&self) -> Result<()> {
        let (positive, negative) = (self.n_positive(), self.n_negative());
        if positive < MIN_EXAMPLES_PER_CLASS || negative < MIN_EXAMPLES_PER_CLASS {
            return Err(ScoringError::InsufficientTrainingData { positive, negative });
        }
        Ok(())
    }

    /// Flattened row-major features of one class.
    pub fn features(&self, label: Label) -> Vec<f32> {
        self.examples
            .iter()
            .filter(|e| e.label == label)
            .flat_map(|e| e.embedding.iter().copied())
            .collect()
    }

    /// Keep at most `n` examples of each class, chosen without replacement
    /// and shuffled.
    pub fn subsample(&self, n: usize, seed: u64) -> TrainingSet {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut pick = |label: Label| -> Vec<&TrainingExample> {
            let pool: Vec<&TrainingExample> =
                self.examples.iter().filter(|e| e.label == label).collect();
            let k = n.min(pool.len());
            pool.choose_multiple(&mut rng, k).copied().collect()
        };

        let mut selected = pick(Label::Presence);
        selected.extend(pick(Label::Background));
        selected.shuffle(&mut rng);

        TrainingSet {
            examples: selected.into_iter().cloned().collect(),
            n_features: self.n_features,
        }
    }
}

/// Embeddings at the valid occurrence points, with the points kept.
#[derive(Debug, Clone, Default)]
pub struct SampledPoints {
    pub embeddings: Vec<Vec<f32>>,
    pub coords: Vec<SamplePoint>,
}

impl SampledPoints {
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// Sample the mosaic at occurrence points, dropping points outside it.
pub fn sample_occurrences(mosaic: &EmbeddingMosaic, occurrences: &[SamplePoint]) -> SampledPoints {
    let batch = mosaic.sample_at_points(occurrences);
    if batch.invalid_count > 0 {
        warn!(
            invalid = batch.invalid_count,
            total = occurrences.len(),
            "Occurrences outside embedding coverage"
        );
    }

    let mut sampled = SampledPoints::default();
    for (point, result) in occurrences.iter().zip(batch.results) {
        if result.valid {
            sampled.embeddings.push(result.embedding);
            sampled.coords.push(*point);
        }
    }
    sampled
}

/// Draw up to `n` random mosaic pixels as background.
///
/// Pixels containing an excluded coordinate, all-zero (no-data) pixels and
/// pixels already drawn are skipped. Gives up after
/// `n * BACKGROUND_ATTEMPTS_PER_SAMPLE` draws. Coordinates are pixel centres.
pub fn sample_background(
    mosaic: &EmbeddingMosaic,
    n: usize,
    exclude: &[SamplePoint],
    seed: u64,
) -> SampledPoints {
    let mut sampled = SampledPoints::default();
    let (height, width) = (mosaic.height(), mosaic.width());
    if n == 0 || height == 0 || width == 0 {
        return sampled;
    }

    let mut taken: HashSet<(usize, usize)> = exclude
        .iter()
        .filter_map(|p| mosaic.pixel_index(p.lon, p.lat))
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let max_attempts = n * BACKGROUND_ATTEMPTS_PER_SAMPLE;
    let mut attempts = 0;

    while sampled.len() < n && attempts < max_attempts {
        attempts += 1;
        let row = rng.gen_range(0..height);
        let col = rng.gen_range(0..width);

        if taken.contains(&(row, col)) || mosaic.is_zero_pixel(row, col) {
            continue;
        }
        if let Some(embedding) = mosaic.pixel(row, col) {
            let (lon, lat) = mosaic.transform().pixel_center(row as i64, col as i64);
            sampled.embeddings.push(embedding.to_vec());
            sampled.coords.push(SamplePoint::new(lon, lat));
            taken.insert((row, col));
        }
    }

    if sampled.len() < n {
        warn!(
            requested = n,
            sampled = sampled.len(),
            attempts,
            "Background sampling exhausted its attempts"
        );
    }
    debug!(samples = sampled.len(), attempts, "Sampled background pixels");
    sampled
}

/// Uniform random points in `bbox` farther than `min_distance` degrees
/// from every positive.
///
/// Gives up after `n * NEGATIVE_ATTEMPTS_PER_SAMPLE` draws and returns what
/// it found.
pub fn negative_points_in_bbox(
    positives: &[SamplePoint],
    n: usize,
    bbox: &BoundingBox,
    min_distance: f64,
    seed: u64,
) -> Vec<SamplePoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(n);
    let max_attempts = n * NEGATIVE_ATTEMPTS_PER_SAMPLE;
    let mut attempts = 0;
    let min_sq = min_distance * min_distance;

    while points.len() < n && attempts < max_attempts {
        attempts += 1;
        let lon = uniform(&mut rng, bbox.min_lon, bbox.max_lon);
        let lat = uniform(&mut rng, bbox.min_lat, bbox.max_lat);

        let clear = positives.iter().all(|p| {
            let (dx, dy) = (p.lon - lon, p.lat - lat);
            dx * dx + dy * dy > min_sq
        });
        if clear {
            points.push(SamplePoint::new(lon, lat));
        }
    }

    if points.len() < n {
        warn!(
            requested = n,
            generated = points.len(),
            "Could not place all negative points"
        );
    }
    points
}

fn uniform(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_common::GeoTransform;

    fn example(value: f32, label: Label) -> TrainingExample {
        TrainingExample {
            embedding: vec![value, value],
            label,
        }
    }

    /// 4x4 mosaic over lon [0, 0.4], lat [52.0, 52.4]; the top row is no-data.
    fn mosaic() -> EmbeddingMosaic {
        let data = (0..4)
            .flat_map(|r| (0..4).flat_map(move |c| {
                let v = if r == 0 { 0.0 } else { (r * 4 + c) as f32 };
                [v, -v]
            }))
            .collect();
        let transform = GeoTransform::from_bounds(0.0, 52.0, 0.4, 52.4, 4, 4);
        EmbeddingMosaic::new([4, 4, 2], data, transform).unwrap()
    }

    #[test]
    fn test_validate_requires_two_per_class() {
        let mut set = TrainingSet::new();
        set.push(example(1.0, Label::Presence)).unwrap();
        set.push(example(0.0, Label::Background)).unwrap();
        set.push(example(0.1, Label::Background)).unwrap();
        assert!(matches!(
            set.validate(),
            Err(ScoringError::InsufficientTrainingData {
                positive: 1,
                negative: 2
            })
        ));

        set.push(example(0.9, Label::Presence)).unwrap();
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_push_rejects_mixed_widths() {
        let mut set = TrainingSet::new();
        set.push(example(1.0, Label::Presence)).unwrap();
        let err = set
            .push(TrainingExample {
                embedding: vec![1.0],
                label: Label::Background,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_features_flatten_one_class() {
        let set = TrainingSet::from_embeddings(
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            vec![vec![-1.0, -2.0]],
        )
        .unwrap();
        assert_eq!(set.features(Label::Presence), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(set.features(Label::Background), vec![-1.0, -2.0]);
    }

    #[test]
    fn test_subsample_balances_classes() {
        let positives = (0..10).map(|i| vec![i as f32, 0.0]);
        let negatives = (0..30).map(|i| vec![-(i as f32), 0.0]);
        let set = TrainingSet::from_embeddings(positives, negatives).unwrap();

        let sub = set.subsample(4, 7);
        assert_eq!(sub.n_positive(), 4);
        assert_eq!(sub.n_negative(), 4);
        assert_eq!(sub, set.subsample(4, 7));

        let capped = set.subsample(50, 7);
        assert_eq!(capped.n_positive(), 10);
        assert_eq!(capped.n_negative(), 30);
    }

    #[test]
    fn test_sample_occurrences_drops_outside_points() {
        let mosaic = mosaic();
        let points = [
            SamplePoint::new(0.15, 52.15),
            SamplePoint::new(5.0, 52.15),
            SamplePoint::new(0.35, 52.05),
        ];
        let sampled = sample_occurrences(&mosaic, &points);
        assert_eq!(sampled.len(), 2);
        assert_eq!(sampled.coords[1], points[2]);
        assert_eq!(sampled.embeddings[1], vec![15.0, -15.0]);
    }

    #[test]
    fn test_background_skips_excluded_and_zero_pixels() {
        let mosaic = mosaic();
        // Occurrence in pixel (1, 1).
        let exclude = [SamplePoint::new(0.15, 52.25)];
        let background = sample_background(&mosaic, 11, &exclude, 42);

        assert_eq!(background.len(), 11);
        let mut seen = HashSet::new();
        for point in &background.coords {
            let (row, col) = mosaic.pixel_index(point.lon, point.lat).unwrap();
            assert_ne!(row, 0, "no-data row sampled");
            assert_ne!((row, col), (1, 1), "excluded pixel sampled");
            assert!(seen.insert((row, col)), "pixel sampled twice");
        }
    }

    #[test]
    fn test_background_is_seeded() {
        let mosaic = mosaic();
        let a = sample_background(&mosaic, 5, &[], 3);
        let b = sample_background(&mosaic, 5, &[], 3);
        assert_eq!(a.coords, b.coords);
    }

    #[test]
    fn test_background_stops_when_pixels_run_out() {
        let mosaic = mosaic();
        // Only 12 pixels carry data.
        let background = sample_background(&mosaic, 50, &[], 1);
        assert!(background.len() <= 12);
    }

    #[test]
    fn test_negative_points_keep_distance() {
        let bbox = BoundingBox::new(0.0, 52.0, 0.1, 52.1);
        let positives = [SamplePoint::new(0.05, 52.05)];
        let points = negative_points_in_bbox(&positives, 200, &bbox, 0.02, 9);

        assert_eq!(points.len(), 200);
        for p in &points {
            assert!(bbox.contains(p.lon, p.lat));
            let d = ((p.lon - 0.05).powi(2) + (p.lat - 52.05).powi(2)).sqrt();
            assert!(d > 0.02);
        }
    }

    #[test]
    fn test_negative_points_give_up() {
        let bbox = BoundingBox::new(0.0, 52.0, 0.01, 52.01);
        let positives = [SamplePoint::new(0.005, 52.005)];
        let points = negative_points_in_bbox(&positives, 10, &bbox, 1.0, 1);
        assert!(points.is_empty());
    }
}
