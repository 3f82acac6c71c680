//! The assembled embedding mosaic and point sampling.

mod builder;

pub use builder::MosaicBuilder;

use geo_common::{generate_grid, BoundingBox, Crs, GeoResult, GeoTransform, SamplePoint};

use crate::error::{EmbeddingError, Result};
use crate::types::{PixelEmbeddings, SampleBatch, SampleResult};

/// A row-major (H, W, C) float32 raster of embeddings, north-up in WGS84.
///
/// Immutable once built; share it behind an `Arc` for concurrent sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMosaic {
    data: Vec<f32>,
    height: usize,
    width: usize,
    channels: usize,
    transform: GeoTransform,
    crs: Crs,
}

impl EmbeddingMosaic {
    pub fn new(shape: [usize; 3], data: Vec<f32>, transform: GeoTransform) -> Result<Self> {
        let [height, width, channels] = shape;
        if data.len() != height * width * channels {
            return Err(EmbeddingError::shape_mismatch(format!(
                "mosaic data has {} values, shape {:?} requires {}",
                data.len(),
                shape,
                height * width * channels
            )));
        }
        Ok(Self {
            data,
            height,
            width,
            channels,
            transform,
            crs: Crs::Wgs84,
        })
    }

    /// Shape as (H, W, C).
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Raw row-major values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Geographic extent covered by the pixels.
    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Embedding of pixel `(row, col)`, or `None` outside the raster.
    pub fn pixel(&self, row: usize, col: usize) -> Option<&[f32]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let start = (row * self.width + col) * self.channels;
        Some(&self.data[start..start + self.channels])
    }

    /// Pixel containing `(lon, lat)`, if it lies inside the raster.
    pub fn pixel_index(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        self.transform.pixel_within(lon, lat, self.width, self.height)
    }

    /// True when every channel of the pixel is zero (the no-data fill).
    pub fn is_zero_pixel(&self, row: usize, col: usize) -> bool {
        self.pixel(row, col)
            .map_or(true, |e| e.iter().all(|v| *v == 0.0))
    }

    /// Nearest-pixel embeddings for each point, in input order.
    ///
    /// Points outside the raster yield a zero vector with `valid = false`.
    pub fn sample_at_points(&self, points: &[SamplePoint]) -> SampleBatch {
        let mut batch = SampleBatch {
            results: Vec::with_capacity(points.len()),
            invalid_count: 0,
        };

        for point in points {
            match self.pixel_index(point.lon, point.lat) {
                Some((row, col)) => {
                    let start = (row * self.width + col) * self.channels;
                    batch.results.push(SampleResult {
                        embedding: self.data[start..start + self.channels].to_vec(),
                        valid: true,
                    });
                }
                None => {
                    batch.invalid_count += 1;
                    batch.results.push(SampleResult {
                        embedding: vec![0.0; self.channels],
                        valid: false,
                    });
                }
            }
        }

        batch
    }

    /// Regular half-open sample grid over `bbox`, latitude-major.
    pub fn generate_grid(&self, bbox: &BoundingBox, resolution: f64) -> GeoResult<Vec<SamplePoint>> {
        generate_grid(bbox, resolution)
    }

    /// Every pixel's embedding with its `(row, col)`, row-major.
    pub fn all_pixel_embeddings(&self) -> PixelEmbeddings {
        let coords = (0..self.height)
            .flat_map(|row| (0..self.width).map(move |col| (row, col)))
            .collect();
        PixelEmbeddings {
            data: self.data.clone(),
            channels: self.channels,
            coords,
        }
    }
}
