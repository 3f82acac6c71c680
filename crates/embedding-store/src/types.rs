//! Value types shared by the tile store, mosaic builder and sampler.

use serde::{Deserialize, Serialize};
use std::fmt;

use geo_common::GridCellKey;

/// A dequantized tile: row-major (H, W, C) float32.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTile {
    pub key: GridCellKey,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl EmbeddingTile {
    pub fn new(key: GridCellKey, shape: [usize; 3], data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), shape[0] * shape[1] * shape[2]);
        Self {
            key,
            height: shape[0],
            width: shape[1],
            channels: shape[2],
            data,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// Row `row` as a contiguous `W * C` slice.
    pub fn row(&self, row: usize) -> &[f32] {
        let len = self.width * self.channels;
        &self.data[row * len..(row + 1) * len]
    }
}

/// Result of loading every tile for a bounding box from the local cache.
#[derive(Debug, Clone, Default)]
pub struct TileLoad {
    /// Loaded tiles, in key order.
    pub tiles: Vec<EmbeddingTile>,
    pub keys_requested: usize,
    pub tiles_loaded: usize,
    /// Keys with no data file on disk.
    pub cache_misses: usize,
}

impl TileLoad {
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Embedding at one sample point.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    /// The pixel's embedding, or zeros when `valid` is false.
    pub embedding: Vec<f32>,
    /// False iff the point projects outside the mosaic.
    pub valid: bool,
}

/// Results for a batch of sample points, in input order.
#[derive(Debug, Clone, Default)]
pub struct SampleBatch {
    pub results: Vec<SampleResult>,
    pub invalid_count: usize,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.results.len() - self.invalid_count
    }

    /// Embeddings of valid points only.
    pub fn valid_embeddings(&self) -> impl Iterator<Item = &[f32]> {
        self.results
            .iter()
            .filter(|r| r.valid)
            .map(|r| r.embedding.as_slice())
    }
}

/// Every mosaic pixel flattened row-major, with its (row, col).
#[derive(Debug, Clone)]
pub struct PixelEmbeddings {
    /// `coords.len() * channels` values.
    pub data: Vec<f32>,
    pub channels: usize,
    pub coords: Vec<(usize, usize)>,
}

impl PixelEmbeddings {
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn embedding(&self, index: usize) -> &[f32] {
        &self.data[index * self.channels..(index + 1) * self.channels]
    }
}

/// Where a mosaic's tiles came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileSource {
    Artifact,
    LocalCache,
    Remote,
}

impl fmt::Display for TileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileSource::Artifact => write!(f, "artifact"),
            TileSource::LocalCache => write!(f, "local cache"),
            TileSource::Remote => write!(f, "remote"),
        }
    }
}

/// Counters describing how a mosaic was assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub source: TileSource,
    /// Tiles that contributed pixels.
    pub tiles_used: usize,
    /// Tiles trimmed to the canonical tile size.
    pub tiles_cropped: usize,
    /// Grid cells with no tile, filled with zeros.
    pub cells_zero_filled: usize,
    /// Mosaic shape as (H, W, C).
    pub shape: [usize; 3],
}

impl BuildReport {
    pub(crate) fn new(source: TileSource, shape: [usize; 3]) -> Self {
        Self {
            source,
            tiles_used: 0,
            tiles_cropped: 0,
            cells_zero_filled: 0,
            shape,
        }
    }
}
