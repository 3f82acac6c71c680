//! Errors raised by the species finder.

use embedding_store::EmbeddingError;
use scoring::ScoringError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinderError {
    /// GBIF could not match the name to a taxon.
    #[error("species not found in GBIF: {0}")]
    SpeciesNotFound(String),

    /// Too few occurrences to train on.
    #[error("need at least 2 occurrences with embeddings, found {found} ({valid} inside coverage)")]
    TooFewOccurrences { found: usize, valid: usize },

    /// The occurrence service returned an error or unreadable data.
    #[error("occurrence source error: {0}")]
    Source(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type FinderResult<T> = Result<T, FinderError>;
