//! Training and scoring over an embedding mosaic.
//!
//! Two scoring modes share one classification path:
//!
//! ```text
//! score_grid:   bbox ─► RegularGrid ─► sample_at_points ─► classify valid ─► (n_lat, n_lon) surface
//! score_mosaic: mosaic pixels ───────────────────────────► classify all   ─► (H, W) surface
//! ```
//!
//! Classification runs in chunks of `batch_size` rows across the rayon pool
//! and is reassembled in input order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use embedding_store::EmbeddingMosaic;
use geo_common::{BoundingBox, GeoTransform, RegularGrid, SamplePoint};

use crate::classifier::{Classifier, FeatureMatrix, ProbabilityModel};
use crate::config::ScoringConfig;
use crate::error::{Result, ScoringError};
use crate::surface::{sort_candidates, Candidate, ProbabilitySurface};
use crate::training::{Label, TrainingSet};

/// Output of sparse-grid scoring.
#[derive(Debug, Clone)]
pub struct GridScores {
    /// Grid-shaped probabilities; row 0 is the southernmost latitude.
    pub surface: ProbabilitySurface,
    /// Grid points at or above the threshold, ascending by probability.
    pub candidates: Vec<Candidate>,
    pub total_points: usize,
    pub valid_points: usize,
}

/// Counters logged after a scoring run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total: usize,
    pub valid: usize,
    pub candidates: usize,
}

pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Result<Self> {
        config.validate().map_err(ScoringError::Config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Fit `classifier` on a training set.
    ///
    /// Fails with `InsufficientTrainingData` before any fit is attempted
    /// unless both classes have at least two examples.
    #[instrument(skip_all, fields(positive = set.n_positive(), negative = set.n_negative()))]
    pub fn train<C: Classifier>(&self, classifier: &C, set: &TrainingSet) -> Result<C::Model> {
        set.validate()?;
        let n_features = set
            .n_features()
            .ok_or_else(|| ScoringError::model("training set has no features"))?;

        let positive = set.features(Label::Presence);
        let negative = set.features(Label::Background);
        let model = classifier.fit(
            FeatureMatrix::new(&positive, n_features)?,
            FeatureMatrix::new(&negative, n_features)?,
        )?;

        info!(features = n_features, "Trained classifier");
        Ok(model)
    }

    /// Score a regular sample grid over `bbox`.
    ///
    /// Points outside the mosaic score NaN and are never candidates.
    #[instrument(skip(self, model, mosaic, bbox), fields(bbox = %bbox))]
    pub fn score_grid<M: ProbabilityModel + ?Sized>(
        &self,
        model: &M,
        mosaic: &EmbeddingMosaic,
        bbox: &BoundingBox,
        resolution: f64,
        threshold: f32,
    ) -> Result<GridScores> {
        check_width(model, mosaic)?;

        let grid = RegularGrid::new(*bbox, resolution)?;
        let points: Vec<SamplePoint> = grid.iter().collect();
        let batch = mosaic.sample_at_points(&points);

        let features: Vec<f32> = batch
            .valid_embeddings()
            .flat_map(|e| e.iter().copied())
            .collect();
        let mut probabilities = self.classify(model, &features, mosaic.channels())?.into_iter();

        let mut values = Vec::with_capacity(points.len());
        let mut candidates = Vec::new();
        for (point, result) in points.iter().zip(&batch.results) {
            if !result.valid {
                values.push(f32::NAN);
                continue;
            }
            let p = probabilities
                .next()
                .ok_or_else(|| ScoringError::model("classifier returned too few probabilities"))?;
            if !p.is_nan() && p >= threshold {
                candidates.push(Candidate {
                    lon: point.lon,
                    lat: point.lat,
                    probability: p,
                });
            }
            values.push(p);
        }
        sort_candidates(&mut candidates);

        // Cell centres sit on the grid points, rows running south to north.
        let transform = GeoTransform::new(
            bbox.min_lon - resolution / 2.0,
            bbox.min_lat - resolution / 2.0,
            resolution,
            resolution,
        );
        let surface = ProbabilitySurface::new(values, grid.n_lat(), grid.n_lon(), transform)?;

        let summary = ScoreSummary {
            total: points.len(),
            valid: batch.valid_count(),
            candidates: candidates.len(),
        };
        info!(
            total = summary.total,
            valid = summary.valid,
            candidates = summary.candidates,
            threshold,
            "Scored sample grid"
        );

        Ok(GridScores {
            surface,
            candidates,
            total_points: summary.total,
            valid_points: summary.valid,
        })
    }

    /// Score every native pixel of the mosaic.
    ///
    /// Zero-filled (missing-tile) pixels are classified like any other pixel.
    #[instrument(skip_all, fields(height = mosaic.height(), width = mosaic.width()))]
    pub fn score_mosaic<M: ProbabilityModel + ?Sized>(
        &self,
        model: &M,
        mosaic: &EmbeddingMosaic,
    ) -> Result<ProbabilitySurface> {
        check_width(model, mosaic)?;

        let values = self.classify(model, mosaic.data(), mosaic.channels())?;
        let surface =
            ProbabilitySurface::new(values, mosaic.height(), mosaic.width(), *mosaic.transform())?;

        let stats = surface.stats(0.5);
        info!(
            pixels = surface.values().len(),
            min = ?stats.min,
            max = ?stats.max,
            above_half = stats.above,
            "Scored mosaic"
        );
        Ok(surface)
    }

    /// Classify row-major `features` in `batch_size` chunks, preserving order.
    fn classify<M: ProbabilityModel + ?Sized>(
        &self,
        model: &M,
        features: &[f32],
        cols: usize,
    ) -> Result<Vec<f32>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_len = self.config.batch_size * cols;

        let chunks = features
            .par_chunks(chunk_len)
            .map(|chunk| {
                let matrix = FeatureMatrix::new(chunk, cols)?;
                let probabilities = model.predict_proba(matrix)?;
                if probabilities.len() != matrix.rows() {
                    return Err(ScoringError::model(format!(
                        "classifier returned {} probabilities for {} rows",
                        probabilities.len(),
                        matrix.rows()
                    )));
                }
                Ok(probabilities)
            })
            .collect::<Result<Vec<Vec<f32>>>>()?;

        debug!(chunks = chunks.len(), rows = features.len() / cols, "Classified features");
        Ok(chunks.concat())
    }
}

fn check_width<M: ProbabilityModel + ?Sized>(model: &M, mosaic: &EmbeddingMosaic) -> Result<()> {
    if model.n_features() != mosaic.channels() {
        return Err(ScoringError::dimension_mismatch(
            model.n_features(),
            mosaic.channels(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logistic::LogisticRegression;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_utils::{assert_approx_eq, assert_coords_approx_eq};

    /// Probability = first feature, clamped.
    struct FirstFeature {
        width: usize,
        calls: AtomicUsize,
    }

    impl FirstFeature {
        fn new(width: usize) -> Self {
            Self {
                width,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ProbabilityModel for FirstFeature {
        fn n_features(&self) -> usize {
            self.width
        }

        fn predict_proba(&self, features: FeatureMatrix<'_>) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(features.iter_rows().map(|r| r[0].clamp(0.0, 1.0)).collect())
        }
    }

    /// 3x3 mosaic over lon [0, 0.3], lat [52.0, 52.3]; channel 0 = col / 2.
    fn ramp_mosaic() -> EmbeddingMosaic {
        let data = (0..3)
            .flat_map(|_| (0..3).flat_map(|c| [c as f32 / 2.0, 1.0]))
            .collect();
        let transform = GeoTransform::from_bounds(0.0, 52.0, 0.3, 52.3, 3, 3);
        EmbeddingMosaic::new([3, 3, 2], data, transform).unwrap()
    }

    fn engine(batch_size: usize) -> ScoringEngine {
        ScoringEngine::new(ScoringConfig {
            batch_size,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_train_requires_two_per_class() {
        let set = TrainingSet::from_embeddings(
            vec![vec![1.0, 0.0]],
            vec![vec![0.0, 1.0], vec![0.1, 0.9]],
        )
        .unwrap();
        let err = engine(10)
            .train(&LogisticRegression::default(), &set)
            .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::InsufficientTrainingData {
                positive: 1,
                negative: 2
            }
        ));
    }

    #[test]
    fn test_train_two_and_two_succeeds() {
        let set = TrainingSet::from_embeddings(
            vec![vec![1.0, 0.0], vec![0.9, 0.1]],
            vec![vec![0.0, 1.0], vec![0.1, 0.9]],
        )
        .unwrap();
        let model = engine(10)
            .train(&LogisticRegression::default(), &set)
            .unwrap();
        assert_eq!(model.n_features(), 2);
    }

    #[test]
    fn test_score_mosaic_matches_pixels_in_order() {
        let mosaic = ramp_mosaic();
        let model = FirstFeature::new(2);
        // Batch of 2 rows forces 5 chunks for 9 pixels.
        let surface = engine(2).score_mosaic(&model, &mosaic).unwrap();

        assert_eq!(surface.shape(), [3, 3]);
        assert_eq!(surface.values(), &[0.0, 0.5, 1.0, 0.0, 0.5, 1.0, 0.0, 0.5, 1.0]);
        assert_eq!(surface.transform(), mosaic.transform());
        assert_eq!(model.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_score_mosaic_rejects_wrong_width() {
        let err = engine(10)
            .score_mosaic(&FirstFeature::new(3), &ramp_mosaic())
            .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_score_grid_marks_outside_points_nan() {
        let mosaic = ramp_mosaic();
        // Extends one column east of the mosaic.
        let bbox = BoundingBox::new(0.05, 52.05, 0.45, 52.25);
        let scores = engine(4)
            .score_grid(&FirstFeature::new(2), &mosaic, &bbox, 0.1, 0.5)
            .unwrap();

        assert_eq!(scores.surface.shape(), [2, 4]);
        assert_eq!(scores.total_points, 8);
        assert_eq!(scores.valid_points, 6);

        let row0 = &scores.surface.values()[..4];
        assert_eq!(&row0[..3], &[0.0, 0.5, 1.0]);
        assert!(row0[3].is_nan());

        // 0.5 twice and 1.0 twice, ascending.
        let probs: Vec<f32> = scores.candidates.iter().map(|c| c.probability).collect();
        assert_eq!(probs, vec![0.5, 0.5, 1.0, 1.0]);
        let first = scores.candidates[0];
        assert_approx_eq!(first.lon, 0.15, 1e-9);
    }

    #[test]
    fn test_grid_surface_centres_are_grid_points() {
        let mosaic = ramp_mosaic();
        let bbox = BoundingBox::new(0.05, 52.05, 0.25, 52.25);
        let scores = engine(100)
            .score_grid(&FirstFeature::new(2), &mosaic, &bbox, 0.1, 0.0)
            .unwrap();

        let (lon, lat) = scores.surface.transform().pixel_center(1, 0);
        assert_coords_approx_eq!((lon, lat), (0.05, 52.15), 1e-9);
    }

    #[test]
    fn test_grid_entirely_outside_scores_nothing() {
        let mosaic = ramp_mosaic();
        let bbox = BoundingBox::new(10.0, 10.0, 10.2, 10.2);
        let model = FirstFeature::new(2);
        let scores = engine(100)
            .score_grid(&model, &mosaic, &bbox, 0.1, 0.0)
            .unwrap();
        assert_eq!(scores.valid_points, 0);
        assert!(scores.candidates.is_empty());
        assert!(scores.surface.values().iter().all(|v| v.is_nan()));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ScoringConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            ScoringEngine::new(config),
            Err(ScoringError::Config(_))
        ));
    }
}
