//! Error types for geographic primitives.

use thiserror::Error;

/// Result type alias using GeoError.
pub type GeoResult<T> = Result<T, GeoError>;

/// Errors raised while constructing or parsing geographic primitives.
#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid number in bounding box: {0}")]
    InvalidNumber(String),

    #[error("Invalid grid resolution: {0}")]
    InvalidResolution(f64),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Unsupported transform: {0}")]
    UnsupportedTransform(String),
}
