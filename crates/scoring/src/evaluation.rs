//! Holdout evaluation.
//!
//! A share of the occurrence samples is kept out of training. After the fit,
//! those points are scored against fresh negatives placed in the region away
//! from every occurrence, and the result is summarised as accuracy at a fixed
//! threshold plus the mean probability of each class.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use embedding_store::EmbeddingMosaic;
use geo_common::{BoundingBox, SamplePoint};

use crate::classifier::{FeatureMatrix, ProbabilityModel};
use crate::error::{Result, ScoringError};
use crate::training::{
    negative_points_in_bbox, Label, SampledPoints, TrainingSet, DEFAULT_MIN_DISTANCE,
    MIN_EXAMPLES_PER_CLASS,
};

/// Probability at which a holdout row counts as a predicted presence.
pub const EVALUATION_THRESHOLD: f32 = 0.5;

/// Negative points requested per held-out occurrence. Extra points cover
/// those that land outside the mosaic or on no-data pixels.
pub const NEGATIVE_OVERSAMPLE: usize = 2;

/// Holdout scores of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub n_positive: usize,
    pub n_negative: usize,
    /// Share of rows on the correct side of `threshold`.
    pub accuracy: f64,
    pub mean_positive: f32,
    pub mean_negative: f32,
    pub threshold: f32,
}

/// Split occurrence samples into `(training, held_out)`.
///
/// Holds out `round(len * fraction)` points chosen at random, but never so
/// many that training keeps fewer than `MIN_EXAMPLES_PER_CLASS`. Both halves
/// keep the input order.
pub fn holdout_split(
    points: SampledPoints,
    fraction: f64,
    seed: u64,
) -> (SampledPoints, SampledPoints) {
    let len = points.len();
    let wanted = (len as f64 * fraction).round() as usize;
    let k = wanted.min(len.saturating_sub(MIN_EXAMPLES_PER_CLASS));
    if k == 0 {
        return (points, SampledPoints::default());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut held = vec![false; len];
    let indices: Vec<usize> = (0..len).collect();
    for &i in indices.choose_multiple(&mut rng, k) {
        held[i] = true;
    }

    let mut train = SampledPoints::default();
    let mut test = SampledPoints::default();
    for ((embedding, coord), held) in points.embeddings.into_iter().zip(points.coords).zip(held) {
        let side = if held { &mut test } else { &mut train };
        side.embeddings.push(embedding);
        side.coords.push(coord);
    }
    (train, test)
}

/// Held-out positives against negatives drawn from `bbox`.
///
/// Negatives lie farther than [`DEFAULT_MIN_DISTANCE`] from every point in
/// `occurrences` and must hit a mosaic pixel with data. The set is balanced
/// with [`TrainingSet::subsample`] so neither class outnumbers the other.
/// `None` when either class ends up empty.
pub fn evaluation_set(
    mosaic: &EmbeddingMosaic,
    held_out: &SampledPoints,
    occurrences: &[SamplePoint],
    bbox: &BoundingBox,
    seed: u64,
) -> Result<Option<TrainingSet>> {
    if held_out.is_empty() {
        return Ok(None);
    }

    let points = negative_points_in_bbox(
        occurrences,
        held_out.len() * NEGATIVE_OVERSAMPLE,
        bbox,
        DEFAULT_MIN_DISTANCE,
        seed,
    );
    let negatives: Vec<Vec<f32>> = mosaic
        .sample_at_points(&points)
        .results
        .into_iter()
        .filter(|r| r.valid && r.embedding.iter().any(|v| *v != 0.0))
        .map(|r| r.embedding)
        .collect();
    debug!(requested = points.len(), usable = negatives.len(), "Evaluation negatives");
    if negatives.is_empty() {
        return Ok(None);
    }

    let set = TrainingSet::from_embeddings(held_out.embeddings.iter().cloned(), negatives)?;
    let n = set.n_positive().min(set.n_negative());
    Ok(Some(set.subsample(n, seed)))
}

/// Score both classes of `set` and compare against their labels.
#[instrument(skip_all, fields(positive = set.n_positive(), negative = set.n_negative()))]
pub fn evaluate<M: ProbabilityModel + ?Sized>(
    model: &M,
    set: &TrainingSet,
    threshold: f32,
) -> Result<Evaluation> {
    let (n_positive, n_negative) = (set.n_positive(), set.n_negative());
    if n_positive == 0 || n_negative == 0 {
        return Err(ScoringError::InsufficientTrainingData {
            positive: n_positive,
            negative: n_negative,
        });
    }
    let cols = set
        .n_features()
        .ok_or_else(|| ScoringError::model("evaluation set has no features"))?;

    let positive = set.features(Label::Presence);
    let negative = set.features(Label::Background);
    let p_pos = model.predict_proba(FeatureMatrix::new(&positive, cols)?)?;
    let p_neg = model.predict_proba(FeatureMatrix::new(&negative, cols)?)?;
    if p_pos.len() != n_positive || p_neg.len() != n_negative {
        return Err(ScoringError::model("classifier returned the wrong number of probabilities"));
    }

    let correct = p_pos.iter().filter(|p| **p >= threshold).count()
        + p_neg.iter().filter(|p| **p < threshold).count();
    let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;

    let evaluation = Evaluation {
        n_positive,
        n_negative,
        accuracy: correct as f64 / (n_positive + n_negative) as f64,
        mean_positive: mean(&p_pos),
        mean_negative: mean(&p_neg),
        threshold,
    };
    info!(
        accuracy = %format_args!("{:.3}", evaluation.accuracy),
        mean_positive = evaluation.mean_positive,
        mean_negative = evaluation.mean_negative,
        "Holdout evaluation"
    );
    Ok(evaluation)
}
