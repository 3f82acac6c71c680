//! Regular sample grids over a bounding box.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{GeoError, GeoResult};

/// Step counts within this distance of an integer are treated as that
/// integer, so `0.3 / 0.1` does not produce a fourth step sitting on `max`.
const STEP_EPSILON: f64 = 1e-9;

/// A geographic sample location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub lon: f64,
    pub lat: f64,
}

impl SamplePoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<(f64, f64)> for SamplePoint {
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

/// Half-open regular grid: `lon ∈ [min_lon, max_lon)`, `lat ∈ [min_lat, max_lat)`.
///
/// Points are ordered latitude-major (south to north), longitude-minor
/// (west to east). The grid is a value; iterating it twice yields the same
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegularGrid {
    bbox: BoundingBox,
    resolution: f64,
    n_lon: usize,
    n_lat: usize,
}

/// `ceil(extent / resolution)`, except that ratios within [`STEP_EPSILON`]
/// of an integer snap to it. Without the snap, an exact multiple such as
/// `(52.35 - 52.05) / 0.01 = 30.000000000000426` would gain a step whose
/// point lands on the excluded upper edge.
fn step_count(extent: f64, resolution: f64) -> usize {
    let ratio = extent / resolution;
    let nearest = ratio.round();
    let steps = if (ratio - nearest).abs() < STEP_EPSILON {
        nearest
    } else {
        ratio.ceil()
    };
    steps.max(0.0) as usize
}

impl RegularGrid {
    pub fn new(bbox: BoundingBox, resolution: f64) -> GeoResult<Self> {
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(GeoError::InvalidResolution(resolution));
        }
        bbox.validate()?;

        Ok(Self {
            bbox,
            resolution,
            n_lon: step_count(bbox.width(), resolution),
            n_lat: step_count(bbox.height(), resolution),
        })
    }

    /// Number of longitude steps (columns).
    pub fn n_lon(&self) -> usize {
        self.n_lon
    }

    /// Number of latitude steps (rows).
    pub fn n_lat(&self) -> usize {
        self.n_lat
    }

    pub fn len(&self) -> usize {
        self.n_lon * self.n_lat
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Point at grid position `(lat_index, lon_index)`.
    pub fn point(&self, lat_index: usize, lon_index: usize) -> SamplePoint {
        SamplePoint::new(
            self.bbox.min_lon + lon_index as f64 * self.resolution,
            self.bbox.min_lat + lat_index as f64 * self.resolution,
        )
    }

    /// Iterate all points in lat-major order.
    pub fn iter(&self) -> impl Iterator<Item = SamplePoint> + '_ {
        (0..self.n_lat).flat_map(move |j| (0..self.n_lon).map(move |i| self.point(j, i)))
    }
}

/// Materialise a [`RegularGrid`] as a point list.
pub fn generate_grid(bbox: &BoundingBox, resolution: f64) -> GeoResult<Vec<SamplePoint>> {
    let grid = RegularGrid::new(*bbox, resolution)?;
    Ok(grid.iter().collect())
}
