//! Habitat scoring over embedding mosaics.
//!
//! Trains a presence/background classifier on mosaic embeddings and turns
//! its predictions into probability surfaces and candidate locations.
//!
//! # Pipeline
//!
//! ```text
//! occurrences ──► sample_occurrences ──┐
//!                                      ├──► TrainingSet ──► ScoringEngine::train ──► model
//! mosaic ───────► sample_background ───┘
//!
//! model + mosaic ──► score_mosaic ──► ProbabilitySurface ──► candidates ──► GeoJSON
//!                └─► score_grid ───► GridScores
//!
//! held-out occurrences + negative_points_in_bbox ──► evaluate ──► Evaluation
//! ```
//!
//! # Example
//!
//! ```ignore
//! use scoring::{LogisticRegression, ScoringConfig, ScoringEngine, TrainingSet};
//!
//! let engine = ScoringEngine::new(ScoringConfig::default())?;
//! let set = TrainingSet::from_embeddings(positives, negatives)?;
//! let model = engine.train(&LogisticRegression::default(), &set)?;
//! let surface = engine.score_mosaic(&model, &mosaic)?;
//! let candidates = surface.candidates(0.5);
//! ```

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod geojson;
pub mod logistic;
pub mod surface;
pub mod training;

pub use classifier::{Classifier, FeatureMatrix, ProbabilityModel};
pub use config::ScoringConfig;
pub use engine::{GridScores, ScoreSummary, ScoringEngine};
pub use error::{Result, ScoringError};
pub use evaluation::{evaluate, evaluation_set, holdout_split, Evaluation, EVALUATION_THRESHOLD};
pub use geojson::{Feature, FeatureCollection, Geometry, RunMetadata};
pub use logistic::{LogisticModel, LogisticRegression};
pub use surface::{subsample_candidates, Candidate, ProbabilitySurface, SurfaceStats};
pub use training::{
    negative_points_in_bbox, sample_background, sample_occurrences, Label, SampledPoints,
    TrainingExample, TrainingSet, DEFAULT_MIN_DISTANCE,
};
