//! Error types for training and scoring.

use embedding_store::EmbeddingError;
use geo_common::GeoError;
use thiserror::Error;

/// Errors that can occur while training a classifier or scoring a mosaic.
///
/// Sample points without data are not errors: they score as NaN.
#[derive(Error, Debug)]
pub enum ScoringError {
    /// Fewer than two examples of either class.
    #[error("insufficient training data: {positive} positive and {negative} negative examples (need at least 2 of each)")]
    InsufficientTrainingData { positive: usize, negative: usize },

    /// Feature vectors disagree in length.
    #[error("dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The classifier failed to fit or produced unusable output.
    #[error("model error: {0}")]
    Model(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScoringError {
    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create a Model error.
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }
}

/// Result type for scoring operations.
pub type Result<T> = std::result::Result<T, ScoringError>;
