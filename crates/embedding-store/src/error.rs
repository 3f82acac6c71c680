//! Error types for tile loading and mosaic assembly.

use geo_common::{BoundingBox, GeoError, GridCellKey};
use thiserror::Error;

use crate::npy::NpyError;

/// Errors that can occur while loading tiles or building a mosaic.
///
/// Points falling outside a mosaic are not errors; sampling reports them as
/// invalid results instead.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No tiles cover the requested region from any available source.
    #[error("no embedding tiles available for {bbox} in year {year}")]
    DataUnavailable { bbox: String, year: i32 },

    /// A cached tile exists but its files are malformed or inconsistent.
    #[error("corrupt cache tile {key}: {reason}")]
    CacheCorrupt { key: String, reason: String },

    /// Tiles disagree on channel count.
    #[error("mosaic shape mismatch: {0}")]
    MosaicShapeMismatch(String),

    /// A tile carries a transform the mosaic cannot represent.
    #[error("unsupported transform: {0}")]
    UnsupportedTransform(String),

    /// Failure propagated from a remote tile fetcher.
    #[error("remote fetch failed: {0}")]
    Fetch(String),

    /// Reading or writing a raster artifact failed.
    #[error("raster artifact error: {0}")]
    Artifact(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmbeddingError {
    /// Create a DataUnavailable error.
    pub fn data_unavailable(bbox: &BoundingBox, year: i32) -> Self {
        Self::DataUnavailable {
            bbox: bbox.to_string(),
            year,
        }
    }

    /// Create a CacheCorrupt error for a tile key.
    pub fn cache_corrupt(key: &GridCellKey, reason: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            key: key.tile_name(),
            reason: reason.into(),
        }
    }

    /// Create a MosaicShapeMismatch error.
    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::MosaicShapeMismatch(msg.into())
    }

    /// Create a Fetch error.
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create an Artifact error.
    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }

    /// Wrap a codec failure for a specific tile.
    pub(crate) fn from_npy(key: &GridCellKey, err: NpyError) -> Self {
        Self::cache_corrupt(key, err.to_string())
    }
}

impl From<tiff::TiffError> for EmbeddingError {
    fn from(err: tiff::TiffError) -> Self {
        Self::Artifact(err.to_string())
    }
}

/// Result type for embedding store operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;
