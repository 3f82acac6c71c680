//! The global embedding tile grid.
//!
//! Embedding tiles are 0.1° × 0.1° blocks whose south-west corners sit on a
//! grid offset by 0.05° (…, -0.05, 0.05, 0.15, …). A tile is identified by its
//! SW corner, formatted to two decimals in cache paths
//! (`grid_0.15_52.05`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bbox::BoundingBox;

/// Tile edge length in degrees.
pub const TILE_STEP: f64 = 0.1;

/// Offset of tile corners from whole multiples of [`TILE_STEP`].
pub const TILE_OFFSET: f64 = 0.05;

/// Tolerance applied when snapping coordinates onto the grid, so that
/// `52.15` stored as `52.149999…` still lands on its own tile.
const SNAP_EPSILON: f64 = 1e-9;

/// Key of one tile: its SW corner in hundredths of a degree.
///
/// Keys are stored as integers so they hash and order exactly; the two
/// decimal places match the precision of the on-disk naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCellKey {
    lon_centi: i32,
    lat_centi: i32,
}

impl GridCellKey {
    /// Key for a tile whose SW corner is at `(lon, lat)`.
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            lon_centi: (lon * 100.0).round() as i32,
            lat_centi: (lat * 100.0).round() as i32,
        }
    }

    /// Longitude of the SW corner.
    pub fn lon(&self) -> f64 {
        self.lon_centi as f64 / 100.0
    }

    /// Latitude of the SW corner.
    pub fn lat(&self) -> f64 {
        self.lat_centi as f64 / 100.0
    }

    /// Directory/file stem used by the local cache: `grid_{lon:.2}_{lat:.2}`.
    pub fn tile_name(&self) -> String {
        format!("grid_{:.2}_{:.2}", self.lon(), self.lat())
    }
}

impl fmt::Display for GridCellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.lon(), self.lat())
    }
}

/// A regular tile grid described by its step and corner offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    /// Tile edge length in degrees.
    pub step: f64,
    /// Offset of tile corners from multiples of `step`.
    pub offset: f64,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self {
            step: TILE_STEP,
            offset: TILE_OFFSET,
        }
    }
}

impl TileGrid {
    pub fn new(step: f64, offset: f64) -> Self {
        Self { step, offset }
    }

    fn index_floor(&self, coord: f64) -> i64 {
        ((coord - self.offset) / self.step + SNAP_EPSILON).floor() as i64
    }

    fn index_ceil(&self, coord: f64) -> i64 {
        ((coord - self.offset) / self.step - SNAP_EPSILON).ceil() as i64
    }

    fn corner(&self, index: i64) -> f64 {
        self.offset + index as f64 * self.step
    }

    /// Inclusive index range of tiles overlapping `[min, max]` on one axis.
    ///
    /// A tile `i` covers `[corner(i), corner(i) + step)`; tiles that only touch
    /// `max` at their western/southern edge are excluded. A zero-width range
    /// yields the tile containing `min`.
    fn index_range(&self, min: f64, max: f64) -> (i64, i64) {
        let first = self.index_floor(min);
        let last = (self.index_ceil(max) - 1).max(first);
        (first, last)
    }

    /// Key of the tile containing `(lon, lat)`.
    pub fn key_at(&self, lon: f64, lat: f64) -> GridCellKey {
        GridCellKey::new(
            self.corner(self.index_floor(lon)),
            self.corner(self.index_floor(lat)),
        )
    }

    /// Every tile key whose footprint intersects `bbox`.
    ///
    /// Keys are returned longitude-major (west to east), latitude ascending
    /// within each longitude.
    pub fn keys_for_bbox(&self, bbox: &BoundingBox) -> Vec<GridCellKey> {
        let (lon_first, lon_last) = self.index_range(bbox.min_lon, bbox.max_lon);
        let (lat_first, lat_last) = self.index_range(bbox.min_lat, bbox.max_lat);

        let mut keys = Vec::with_capacity(
            ((lon_last - lon_first + 1) * (lat_last - lat_first + 1)).max(0) as usize,
        );
        for i in lon_first..=lon_last {
            for j in lat_first..=lat_last {
                keys.push(GridCellKey::new(self.corner(i), self.corner(j)));
            }
        }
        keys
    }

    /// Geographic footprint of a tile.
    pub fn tile_bounds(&self, key: &GridCellKey) -> BoundingBox {
        BoundingBox::new(
            key.lon(),
            key.lat(),
            key.lon() + self.step,
            key.lat() + self.step,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_name_formatting() {
        assert_eq!(GridCellKey::new(0.05, 52.05).tile_name(), "grid_0.05_52.05");
        assert_eq!(GridCellKey::new(-0.05, 52.15).tile_name(), "grid_-0.05_52.15");
        assert_eq!(GridCellKey::new(-120.35, -33.95).tile_name(), "grid_-120.35_-33.95");
    }

    #[test]
    fn test_key_survives_float_noise() {
        let a = GridCellKey::new(0.15, 52.15);
        let b = GridCellKey::new(0.05 + 0.1, 52.05 + 0.1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_at() {
        let grid = TileGrid::default();
        assert_eq!(grid.key_at(0.10, 52.20), GridCellKey::new(0.05, 52.15));
        assert_eq!(grid.key_at(0.04, 52.04), GridCellKey::new(-0.05, 51.95));
        assert_eq!(grid.key_at(0.15, 52.15), GridCellKey::new(0.15, 52.15));
    }

    #[test]
    fn test_keys_for_cambridge_bbox() {
        let grid = TileGrid::default();
        let bbox = BoundingBox::new(0.03, 52.13, 0.22, 52.29);
        let keys = grid.keys_for_bbox(&bbox);

        // lon tiles: -0.05, 0.05, 0.15 ; lat tiles: 52.05, 52.15, 52.25
        assert_eq!(keys.len(), 9);
        assert_eq!(keys[0], GridCellKey::new(-0.05, 52.05));
        assert_eq!(keys[8], GridCellKey::new(0.15, 52.25));
    }

    #[test]
    fn test_keys_exclude_touching_edges() {
        let grid = TileGrid::default();
        let bbox = BoundingBox::new(0.05, 52.05, 0.25, 52.25);
        let keys = grid.keys_for_bbox(&bbox);
        assert_eq!(
            keys,
            vec![
                GridCellKey::new(0.05, 52.05),
                GridCellKey::new(0.05, 52.15),
                GridCellKey::new(0.15, 52.05),
                GridCellKey::new(0.15, 52.15),
            ]
        );
    }

    #[test]
    fn test_point_bbox_yields_containing_tile() {
        let grid = TileGrid::default();
        let bbox = BoundingBox::new(0.12, 52.18, 0.12, 52.18);
        assert_eq!(grid.keys_for_bbox(&bbox), vec![GridCellKey::new(0.05, 52.15)]);
    }
}
