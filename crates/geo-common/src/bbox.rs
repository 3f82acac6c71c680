//! Bounding box types and operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{GeoError, GeoResult};

/// A geographic bounding box in WGS84 degrees.
///
/// Invariant: `min_lon <= max_lon` and `min_lat <= max_lat`. Use
/// [`BoundingBox::try_new`] or [`BoundingBox::validate`] on untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Create a bounding box, rejecting inverted or non-finite corners.
    pub fn try_new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> GeoResult<Self> {
        let bbox = Self::new(min_lon, min_lat, max_lon, max_lat);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check the ordering invariant.
    pub fn validate(&self) -> GeoResult<()> {
        let corners = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if corners.iter().any(|v| !v.is_finite()) {
            return Err(GeoError::InvalidBbox(format!("non-finite corner in {}", self)));
        }
        if self.min_lon > self.max_lon {
            return Err(GeoError::InvalidBbox(format!(
                "min_lon {} > max_lon {}",
                self.min_lon, self.max_lon
            )));
        }
        if self.min_lat > self.max_lat {
            return Err(GeoError::InvalidBbox(format!(
                "min_lat {} > max_lat {}",
                self.min_lat, self.max_lat
            )));
        }
        Ok(())
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Check if this bbox overlaps another with non-zero area.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
            && self.min_lat < other.max_lat
            && self.max_lat > other.min_lat
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_lon: self.min_lon.max(other.min_lon),
            min_lat: self.min_lat.max(other.min_lat),
            max_lon: self.max_lon.min(other.max_lon),
            max_lat: self.max_lat.min(other.max_lat),
        })
    }

    /// Smallest bbox covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Closed containment test.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Half-open containment test: `[min, max)` on both axes.
    pub fn contains_half_open(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon < self.max_lon && lat >= self.min_lat && lat < self.max_lat
    }

    /// Center point as (lon, lat).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Expand the bounding box by a buffer (in degrees).
    pub fn expand(&self, buffer: f64) -> Self {
        Self {
            min_lon: self.min_lon - buffer,
            min_lat: self.min_lat - buffer,
            max_lon: self.max_lon + buffer,
            max_lat: self.max_lat + buffer,
        }
    }

    /// As `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lon [{:.3}, {:.3}], lat [{:.3}, {:.3}]",
            self.min_lon, self.max_lon, self.min_lat, self.max_lat
        )
    }
}

/// Parses `"min_lon,min_lat,max_lon,max_lat"`.
impl FromStr for BoundingBox {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(GeoError::InvalidBbox(format!(
                "{}. Expected 'min_lon,min_lat,max_lon,max_lat'",
                s
            )));
        }

        let mut values = [0.0f64; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| GeoError::InvalidNumber(part.to_string()))?;
        }

        Self::try_new(values[0], values[1], values[2], values[3])
    }
}
