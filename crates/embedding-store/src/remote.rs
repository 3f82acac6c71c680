//! Remote tile retrieval capability.
//!
//! The core never talks to the network itself. A [`RemoteTileFetcher`] is
//! injected per load call; it yields georegistered float tiles lazily and
//! owns its own retry policy.

use geo_common::{BoundingBox, Crs, GeoTransform};

use crate::error::{EmbeddingError, Result};

/// A georegistered float32 (H, W, C) raster returned by a fetcher.
#[derive(Debug, Clone)]
pub struct RemoteTile {
    /// SW corner of the tile's nominal grid cell.
    pub tile_lon: f64,
    pub tile_lat: f64,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<f32>,
    pub crs: Crs,
    /// GDAL-ordered affine coefficients; rotation terms must be zero.
    pub geotransform: [f64; 6],
}

impl RemoteTile {
    pub fn new(
        tile_lon: f64,
        tile_lat: f64,
        shape: [usize; 3],
        data: Vec<f32>,
        geotransform: [f64; 6],
    ) -> Result<Self> {
        let expected = shape[0] * shape[1] * shape[2];
        if data.len() != expected {
            return Err(EmbeddingError::shape_mismatch(format!(
                "remote tile ({}, {}) has {} values, shape {:?} requires {}",
                tile_lon,
                tile_lat,
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self {
            tile_lon,
            tile_lat,
            height: shape[0],
            width: shape[1],
            channels: shape[2],
            data,
            crs: Crs::Wgs84,
            geotransform,
        })
    }

    /// The tile transform, rejecting rotated or south-up rasters.
    pub fn transform(&self) -> Result<GeoTransform> {
        let transform = GeoTransform::from_gdal(self.geotransform)
            .map_err(|e| EmbeddingError::UnsupportedTransform(e.to_string()))?;
        if transform.pixel_width <= 0.0 || transform.pixel_height >= 0.0 {
            return Err(EmbeddingError::UnsupportedTransform(format!(
                "tile ({}, {}) is not north-up",
                self.tile_lon, self.tile_lat
            )));
        }
        Ok(transform)
    }

    pub fn pixel(&self, row: usize, col: usize) -> &[f32] {
        let start = (row * self.width + col) * self.channels;
        &self.data[start..start + self.channels]
    }
}

/// Lazily produced sequence of remote tiles.
pub type RemoteTileIter<'a> = Box<dyn Iterator<Item = Result<RemoteTile>> + 'a>;

/// Source of embedding tiles that are not in the local cache.
///
/// Implementations report transport failures as [`EmbeddingError::Fetch`];
/// an empty iterator means the source has no coverage for the request.
pub trait RemoteTileFetcher: Send + Sync {
    fn fetch<'a>(&'a self, bbox: &BoundingBox, year: i32) -> Result<RemoteTileIter<'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_tile_length_check() {
        let result = RemoteTile::new(0.0, 0.0, [2, 2, 2], vec![0.0; 7], [0.0; 6]);
        assert!(matches!(result, Err(EmbeddingError::MosaicShapeMismatch(_))));
    }

    #[test]
    fn test_rotated_transform_rejected() {
        let tile =
            RemoteTile::new(0.0, 0.0, [1, 1, 1], vec![0.0], [0.0, 0.1, 0.01, 1.0, 0.0, -0.1])
                .unwrap();
        assert!(matches!(
            tile.transform(),
            Err(EmbeddingError::UnsupportedTransform(_))
        ));
    }

    #[test]
    fn test_south_up_transform_rejected() {
        let tile = RemoteTile::new(0.0, 0.0, [1, 1, 1], vec![0.0], [0.0, 0.1, 0.0, 1.0, 0.0, 0.1])
            .unwrap();
        assert!(tile.transform().is_err());
    }
}
