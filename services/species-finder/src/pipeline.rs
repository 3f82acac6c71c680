//! End-to-end candidate search for one species in one region.
//!
//! ```text
//! [1/5] GBIF match + occurrences  (async)
//! [2/5] load embedding mosaic     (blocking pool)
//! [3/5] sample occurrence embeddings, hold some out
//! [4/5] sample background pixels
//! [5/5] train + score + evaluate  (blocking pool)
//! ```
//!
//! Scoring covers every mosaic pixel in [`ScoringMode::Dense`] and a regular
//! sample grid in [`ScoringMode::Grid`]. Either way the result is a
//! [`ProbabilitySurface`] whose pixel centres are the scored locations.

use std::sync::Arc;

use tracing::{info, instrument};

use embedding_store::{BuildReport, EmbeddingMosaic, MosaicLoader, RemoteTileFetcher};
use geo_common::{BoundingBox, SamplePoint};
use scoring::{
    evaluate, evaluation_set, holdout_split, sample_background, sample_occurrences, Evaluation,
    LogisticRegression, ProbabilitySurface, ScoringEngine, SurfaceStats, TrainingSet,
    EVALUATION_THRESHOLD,
};

use crate::config::ScoringMode;
use crate::error::{FinderError, FinderResult};
use crate::gbif::{coordinates, OccurrenceSource, Taxon};

/// Minimum occurrences with embeddings needed to train.
pub const MIN_OCCURRENCES: usize = 2;

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub taxon: Taxon,
    pub bbox: BoundingBox,
    pub year: i32,
    pub mode: ScoringMode,
    /// Sample spacing in degrees, grid mode only.
    pub grid_resolution: Option<f64>,
    /// Occurrences with coordinates returned by the source.
    pub n_found: usize,
    /// Occurrences that fell inside the mosaic, training and held out alike.
    pub occurrences: Vec<SamplePoint>,
    /// Occurrences the classifier was fitted on.
    pub n_trained: usize,
    pub n_background: usize,
    pub surface: ProbabilitySurface,
    pub stats: SurfaceStats,
    /// `None` when too few occurrences remain to hold any out.
    pub evaluation: Option<Evaluation>,
    pub mosaic_report: BuildReport,
}

/// Runs the search with injected collaborators.
pub struct Finder {
    source: Arc<dyn OccurrenceSource>,
    loader: Arc<MosaicLoader>,
    engine: Arc<ScoringEngine>,
    fetcher: Option<Arc<dyn RemoteTileFetcher>>,
    mode: ScoringMode,
}

impl Finder {
    pub fn new(
        source: Arc<dyn OccurrenceSource>,
        loader: MosaicLoader,
        engine: ScoringEngine,
    ) -> Self {
        Self {
            source,
            loader: Arc::new(loader),
            engine: Arc::new(engine),
            fetcher: None,
            mode: ScoringMode::Dense,
        }
    }

    pub fn with_mode(mut self, mode: ScoringMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fall back to `fetcher` when no local tiles cover the region.
    pub fn with_remote(mut self, fetcher: Arc<dyn RemoteTileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[instrument(skip(self, bbox), fields(bbox = %bbox, mode = %self.mode))]
    pub async fn find_candidates(
        &self,
        species: &str,
        bbox: BoundingBox,
        year: i32,
    ) -> FinderResult<PredictionResult> {
        bbox.validate().map_err(embedding_store::EmbeddingError::from)?;

        info!("[1/5] Fetching GBIF data");
        let taxon = self.source.match_species(species).await?;
        let records = self.source.occurrences(taxon.key, &bbox).await?;
        let points = coordinates(&records);
        info!(found = records.len(), with_coordinates = points.len(), "Occurrences in region");
        if points.len() < MIN_OCCURRENCES {
            return Err(FinderError::TooFewOccurrences {
                found: points.len(),
                valid: 0,
            });
        }

        info!("[2/5] Loading embedding mosaic");
        let loaded = {
            let loader = Arc::clone(&self.loader);
            let fetcher = self.fetcher.clone();
            tokio::task::spawn_blocking(move || loader.load(&bbox, year, fetcher.as_deref()))
                .await??
        };
        if loaded.report.cells_zero_filled > 0 {
            info!(cells = loaded.report.cells_zero_filled, "Region only partially covered by tiles");
        }

        let engine = Arc::clone(&self.engine);
        let mosaic = Arc::clone(&loaded.mosaic);
        let n_found = points.len();
        let mode = self.mode;
        let scored = tokio::task::spawn_blocking(move || {
            train_and_score(&engine, &mosaic, &points, &bbox, mode)
        })
        .await??;

        Ok(PredictionResult {
            taxon,
            bbox,
            year,
            mode,
            grid_resolution: match mode {
                ScoringMode::Grid => Some(self.engine.config().grid_resolution),
                ScoringMode::Dense => None,
            },
            n_found,
            occurrences: scored.occurrences,
            n_trained: scored.n_trained,
            n_background: scored.n_background,
            stats: scored.surface.stats(0.5),
            surface: scored.surface,
            evaluation: scored.evaluation,
            mosaic_report: loaded.report,
        })
    }
}

struct Scored {
    occurrences: Vec<SamplePoint>,
    n_trained: usize,
    n_background: usize,
    surface: ProbabilitySurface,
    evaluation: Option<Evaluation>,
}

fn train_and_score(
    engine: &ScoringEngine,
    mosaic: &EmbeddingMosaic,
    points: &[SamplePoint],
    bbox: &BoundingBox,
    mode: ScoringMode,
) -> FinderResult<Scored> {
    info!("[3/5] Sampling occurrence embeddings");
    let positives = sample_occurrences(mosaic, points);
    info!(valid = positives.len(), "Occurrence samples");
    if positives.len() < MIN_OCCURRENCES {
        return Err(FinderError::TooFewOccurrences {
            found: points.len(),
            valid: positives.len(),
        });
    }

    let config = engine.config();
    let occurrences = positives.coords.clone();
    let (train, held_out) = holdout_split(positives, config.holdout_fraction, config.seed);
    if !held_out.is_empty() {
        info!(training = train.len(), held_out = held_out.len(), "Held out occurrences");
    }

    info!("[4/5] Sampling background embeddings");
    let background = sample_background(
        mosaic,
        train.len() * config.negative_ratio,
        &occurrences,
        config.seed,
    );
    info!(samples = background.len(), "Background samples");

    info!("[5/5] Training classifier and predicting");
    let n_trained = train.len();
    let n_background = background.len();
    let set = TrainingSet::from_embeddings(train.embeddings, background.embeddings)?;
    let model = engine.train(&LogisticRegression::default(), &set)?;
    let surface = match mode {
        ScoringMode::Dense => engine.score_mosaic(&model, mosaic)?,
        ScoringMode::Grid => {
            engine
                .score_grid(&model, mosaic, bbox, config.grid_resolution, config.threshold)?
                .surface
        }
    };

    let stats = surface.stats(0.5);
    let share = if stats.valid > 0 {
        100.0 * stats.above as f64 / stats.valid as f64
    } else {
        0.0
    };
    info!(
        min = ?stats.min,
        max = ?stats.max,
        high = stats.above,
        percent = %format_args!("{:.1}", share),
        "High probability pixels (>0.5)"
    );

    let evaluation = match evaluation_set(mosaic, &held_out, &occurrences, bbox, config.seed)? {
        Some(eval_set) => Some(evaluate(&model, &eval_set, EVALUATION_THRESHOLD)?),
        None => None,
    };

    Ok(Scored {
        occurrences,
        n_trained,
        n_background,
        surface,
        evaluation,
    })
}
