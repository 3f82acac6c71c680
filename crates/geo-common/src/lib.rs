//! Geographic primitives shared across the habitat-finder workspace.
//!
//! Everything in this crate works in WGS84 longitude/latitude degrees:
//! bounding boxes, the 0.1° embedding tile grid, north-up affine
//! transforms and regular sample grids.

pub mod bbox;
pub mod cell;
pub mod crs;
pub mod error;
pub mod grid;
pub mod transform;

pub use bbox::BoundingBox;
pub use cell::{GridCellKey, TileGrid, TILE_OFFSET, TILE_STEP};
pub use crs::Crs;
pub use error::{GeoError, GeoResult};
pub use grid::{generate_grid, RegularGrid, SamplePoint};
pub use transform::GeoTransform;
