//! North-up affine transforms between pixel indices and lon/lat.
//!
//! The transform maps the top-left corner of pixel `(row, col)` to
//!
//! ```text
//! lon = origin_lon + col * pixel_width
//! lat = origin_lat + row * pixel_height      (pixel_height < 0)
//! ```
//!
//! Rotation/shear terms are not representable; [`GeoTransform::from_gdal`]
//! rejects them.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{GeoError, GeoResult};

/// Absorbs rounding from the forward transform so that a pixel corner maps
/// back to its own pixel.
const PIXEL_EPSILON: f64 = 1e-9;

/// A rotation-free affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Longitude of the top-left corner of pixel (0, 0).
    pub origin_lon: f64,
    /// Latitude of the top-left corner of pixel (0, 0).
    pub origin_lat: f64,
    /// Degrees of longitude per column (positive).
    pub pixel_width: f64,
    /// Degrees of latitude per row (negative for north-up rasters).
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_lon: f64, origin_lat: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_lon,
            origin_lat,
            pixel_width,
            pixel_height,
        }
    }

    /// Transform covering `[west, east] × [south, north]` with a
    /// `width × height` pixel raster, north-up.
    pub fn from_bounds(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            origin_lon: west,
            origin_lat: north,
            pixel_width: (east - west) / width as f64,
            pixel_height: -(north - south) / height as f64,
        }
    }

    /// Build from GDAL-ordered coefficients
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
    pub fn from_gdal(coeffs: [f64; 6]) -> GeoResult<Self> {
        let [c, a, b, f, d, e] = coeffs;
        if b != 0.0 || d != 0.0 {
            return Err(GeoError::UnsupportedTransform(format!(
                "rotation terms ({}, {}) are not supported",
                b, d
            )));
        }
        if a == 0.0 || e == 0.0 || !a.is_finite() || !e.is_finite() {
            return Err(GeoError::UnsupportedTransform(format!(
                "degenerate pixel size ({}, {})",
                a, e
            )));
        }
        Ok(Self::new(c, f, a, e))
    }

    /// GDAL-ordered coefficients.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_lon,
            self.pixel_width,
            0.0,
            self.origin_lat,
            0.0,
            self.pixel_height,
        ]
    }

    /// Map a coordinate to the pixel containing it.
    ///
    /// Uses floor with a top-left origin: a point on a pixel's western or
    /// northern edge belongs to that pixel. The result may lie outside any
    /// particular raster; callers check bounds.
    pub fn lonlat_to_pixel(&self, lon: f64, lat: f64) -> (i64, i64) {
        let col = (lon - self.origin_lon) / self.pixel_width;
        let row = (lat - self.origin_lat) / self.pixel_height;
        (
            (row + PIXEL_EPSILON).floor() as i64,
            (col + PIXEL_EPSILON).floor() as i64,
        )
    }

    /// Pixel containing `(lon, lat)` within a `width × height` raster.
    ///
    /// `None` for points outside the raster and for non-finite coordinates,
    /// which have no meaningful pixel.
    pub fn pixel_within(&self, lon: f64, lat: f64, width: usize, height: usize) -> Option<(usize, usize)> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        let (row, col) = self.lonlat_to_pixel(lon, lat);
        if row < 0 || col < 0 || row as usize >= height || col as usize >= width {
            None
        } else {
            Some((row as usize, col as usize))
        }
    }

    /// Top-left corner of a pixel.
    pub fn pixel_to_lonlat(&self, row: i64, col: i64) -> (f64, f64) {
        (
            self.origin_lon + col as f64 * self.pixel_width,
            self.origin_lat + row as f64 * self.pixel_height,
        )
    }

    /// Centre of a pixel.
    pub fn pixel_center(&self, row: i64, col: i64) -> (f64, f64) {
        (
            self.origin_lon + (col as f64 + 0.5) * self.pixel_width,
            self.origin_lat + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Geographic extent of a `width × height` raster under this transform.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let (x0, y0) = self.pixel_to_lonlat(0, 0);
        let (x1, y1) = self.pixel_to_lonlat(height as i64, width as i64);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Absolute pixel size in degrees as (width, height).
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Coefficient-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tile_transform() -> GeoTransform {
        // 0.2° x 0.1° covered by 20 x 10 pixels
        GeoTransform::from_bounds(0.05, 52.05, 0.25, 52.15, 20, 10)
    }

    #[test]
    fn test_from_bounds() {
        let t = two_tile_transform();
        assert!((t.pixel_width - 0.01).abs() < 1e-12);
        assert!((t.pixel_height + 0.01).abs() < 1e-12);
        assert_eq!(t.origin_lon, 0.05);
        assert_eq!(t.origin_lat, 52.15);
    }

    #[test]
    fn test_lonlat_to_pixel_floor() {
        let t = two_tile_transform();
        assert_eq!(t.lonlat_to_pixel(0.055, 52.145), (0, 0));
        assert_eq!(t.lonlat_to_pixel(0.249, 52.051), (9, 19));
        // Outside the raster: values are still total.
        assert_eq!(t.lonlat_to_pixel(0.045, 52.155), (-1, -1));
        assert_eq!(t.lonlat_to_pixel(0.25, 52.05), (10, 20));
    }

    #[test]
    fn test_pixel_within() {
        let t = two_tile_transform();
        assert_eq!(t.pixel_within(0.055, 52.145, 20, 10), Some((0, 0)));
        assert_eq!(t.pixel_within(0.249, 52.051, 20, 10), Some((9, 19)));
        assert_eq!(t.pixel_within(0.25, 52.05, 20, 10), None);
        assert_eq!(t.pixel_within(f64::NAN, 52.1, 20, 10), None);
        assert_eq!(t.pixel_within(0.1, f64::NAN, 20, 10), None);
        assert_eq!(t.pixel_within(f64::INFINITY, 52.1, 20, 10), None);
        assert_eq!(t.pixel_within(0.1, f64::NEG_INFINITY, 20, 10), None);
    }

    #[test]
    fn test_corner_round_trip() {
        let t = two_tile_transform();
        for row in 0..10 {
            for col in 0..20 {
                let (lon, lat) = t.pixel_to_lonlat(row, col);
                assert_eq!(t.lonlat_to_pixel(lon, lat), (row, col));
            }
        }
    }

    #[test]
    fn test_bounds() {
        let t = two_tile_transform();
        let b = t.bounds(20, 10);
        assert!((b.min_lon - 0.05).abs() < 1e-12);
        assert!((b.max_lon - 0.25).abs() < 1e-12);
        assert!((b.min_lat - 52.05).abs() < 1e-12);
        assert!((b.max_lat - 52.15).abs() < 1e-12);
    }

    #[test]
    fn test_gdal_rejects_rotation() {
        assert!(GeoTransform::from_gdal([0.0, 0.1, 0.01, 52.0, 0.0, -0.1]).is_err());
        let t = GeoTransform::from_gdal([0.0, 0.1, 0.0, 52.0, 0.0, -0.1]).unwrap();
        assert_eq!(t.to_gdal(), [0.0, 0.1, 0.0, 52.0, 0.0, -0.1]);
    }
}
