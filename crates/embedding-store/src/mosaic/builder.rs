//! Mosaic assembly from grid-aligned cache tiles or remote rasters.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use geo_common::{BoundingBox, GeoTransform, GridCellKey};

use crate::error::{EmbeddingError, Result};
use crate::mosaic::EmbeddingMosaic;
use crate::remote::RemoteTile;
use crate::types::{BuildReport, EmbeddingTile, TileSource};

/// Tolerance when converting a geographic extent to a pixel count.
const EXTENT_EPSILON: f64 = 1e-6;

/// Unique coordinates, compared at the centi-degree precision of tile keys.
fn unique_sorted(mut values: Vec<f64>, descending: bool) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| ((*a - *b) * 100.0).abs() < 0.5);
    if descending {
        values.reverse();
    }
    values
}

fn check_channels(expected: usize, found: usize, what: &str) -> Result<()> {
    if expected != found {
        return Err(EmbeddingError::shape_mismatch(format!(
            "{} has {} channels, expected {}",
            what, found, expected
        )));
    }
    Ok(())
}

/// Stitches tiles into an [`EmbeddingMosaic`].
pub struct MosaicBuilder;

impl MosaicBuilder {
    /// Assemble tiles keyed on the regular tile grid.
    ///
    /// Every cell of the longitude × latitude cross product receives its tile
    /// or a block of zeros. Tiles larger than the smallest tile are cropped
    /// from their top-left corner.
    pub fn from_grid_tiles(
        tiles: Vec<EmbeddingTile>,
        step: f64,
        bbox: &BoundingBox,
        year: i32,
    ) -> Result<(EmbeddingMosaic, BuildReport)> {
        let first = tiles
            .first()
            .ok_or_else(|| EmbeddingError::data_unavailable(bbox, year))?;
        let channels = first.channels;

        let mut tile_h = usize::MAX;
        let mut tile_w = usize::MAX;
        for tile in &tiles {
            check_channels(channels, tile.channels, &format!("tile {}", tile.key))?;
            tile_h = tile_h.min(tile.height);
            tile_w = tile_w.min(tile.width);
        }

        let lons = unique_sorted(tiles.iter().map(|t| t.key.lon()).collect(), false);
        let lats = unique_sorted(tiles.iter().map(|t| t.key.lat()).collect(), true);

        let mut by_key: HashMap<GridCellKey, &EmbeddingTile> = HashMap::with_capacity(tiles.len());
        for tile in &tiles {
            by_key.entry(tile.key).or_insert(tile);
        }

        let height = tile_h * lats.len();
        let width = tile_w * lons.len();
        let row_len = width * channels;
        let block_row_len = tile_w * channels;
        let mut data = vec![0.0f32; height * row_len];

        let mut report = BuildReport::new(TileSource::LocalCache, [height, width, channels]);

        for (lat_idx, &lat) in lats.iter().enumerate() {
            for (lon_idx, &lon) in lons.iter().enumerate() {
                let Some(tile) = by_key.get(&GridCellKey::new(lon, lat)) else {
                    report.cells_zero_filled += 1;
                    continue;
                };

                if tile.height != tile_h || tile.width != tile_w {
                    report.tiles_cropped += 1;
                    debug!(
                        tile = %tile.key,
                        from = ?(tile.height, tile.width),
                        to = ?(tile_h, tile_w),
                        "Cropping tile"
                    );
                }
                report.tiles_used += 1;

                for r in 0..tile_h {
                    let dst = (lat_idx * tile_h + r) * row_len + lon_idx * block_row_len;
                    data[dst..dst + block_row_len]
                        .copy_from_slice(&tile.row(r)[..block_row_len]);
                }
            }
        }

        if report.tiles_cropped > 0 {
            warn!(
                cropped = report.tiles_cropped,
                tile_height = tile_h,
                tile_width = tile_w,
                "Tiles had inconsistent sizes and were cropped"
            );
        }
        if report.cells_zero_filled > 0 {
            info!(
                missing = report.cells_zero_filled,
                "Filled missing tiles with zeros"
            );
        }

        let min_lon = lons[0];
        let max_lat = lats[0];
        let transform = GeoTransform::new(
            min_lon,
            max_lat + step,
            step * lons.len() as f64 / width as f64,
            -step * lats.len() as f64 / height as f64,
        );

        info!(
            tiles = report.tiles_used,
            height,
            width,
            channels,
            "Assembled mosaic from grid tiles"
        );

        let mosaic = EmbeddingMosaic::new([height, width, channels], data, transform)?;
        Ok((mosaic, report))
    }

    /// Merge georegistered rasters onto their union extent.
    ///
    /// The output uses the first tile's resolution. Each output pixel takes
    /// the value of the source pixel under its centre; where tiles overlap
    /// the first tile wins. Uncovered pixels stay zero.
    pub fn from_remote_tiles<I>(
        tiles: I,
        bbox: &BoundingBox,
        year: i32,
    ) -> Result<(EmbeddingMosaic, BuildReport)>
    where
        I: IntoIterator<Item = Result<RemoteTile>>,
    {
        let tiles: Vec<RemoteTile> = tiles.into_iter().collect::<Result<_>>()?;
        let first = tiles
            .first()
            .ok_or_else(|| EmbeddingError::data_unavailable(bbox, year))?;
        let channels = first.channels;

        let mut placed: Vec<(&RemoteTile, GeoTransform, BoundingBox)> =
            Vec::with_capacity(tiles.len());
        for tile in &tiles {
            let what = format!("remote tile ({}, {})", tile.tile_lon, tile.tile_lat);
            check_channels(channels, tile.channels, &what)?;
            let transform = tile.transform()?;
            let bounds = transform.bounds(tile.width, tile.height);
            placed.push((tile, transform, bounds));
        }

        let (pixel_w, pixel_h) = placed[0].1.pixel_size();
        let extent = placed
            .iter()
            .skip(1)
            .fold(placed[0].2, |acc, (_, _, b)| acc.union(b));

        let width = ((extent.width() / pixel_w) - EXTENT_EPSILON).ceil().max(1.0) as usize;
        let height = ((extent.height() / pixel_h) - EXTENT_EPSILON).ceil().max(1.0) as usize;
        let transform = GeoTransform::new(extent.min_lon, extent.max_lat, pixel_w, -pixel_h);

        let mut data = vec![0.0f32; height * width * channels];
        let mut written = vec![false; height * width];

        for (tile, tile_transform, bounds) in &placed {
            // Output pixels whose footprint overlaps this tile.
            let col_start = ((bounds.min_lon - extent.min_lon) / pixel_w + EXTENT_EPSILON)
                .floor()
                .max(0.0) as usize;
            let col_end = (((bounds.max_lon - extent.min_lon) / pixel_w - EXTENT_EPSILON).ceil()
                as usize)
                .min(width);
            let row_start = ((extent.max_lat - bounds.max_lat) / pixel_h + EXTENT_EPSILON)
                .floor()
                .max(0.0) as usize;
            let row_end = (((extent.max_lat - bounds.min_lat) / pixel_h - EXTENT_EPSILON).ceil()
                as usize)
                .min(height);

            for row in row_start..row_end {
                for col in col_start..col_end {
                    let idx = row * width + col;
                    if written[idx] {
                        continue;
                    }
                    let (lon, lat) = transform.pixel_center(row as i64, col as i64);
                    let Some((src_row, src_col)) =
                        tile_transform.pixel_within(lon, lat, tile.width, tile.height)
                    else {
                        continue;
                    };
                    data[idx * channels..(idx + 1) * channels]
                        .copy_from_slice(tile.pixel(src_row, src_col));
                    written[idx] = true;
                }
            }
        }

        let uncovered = written.iter().filter(|w| !**w).count();
        if uncovered > 0 {
            debug!(uncovered, "Remote tiles left pixels uncovered");
        }

        let mut report = BuildReport::new(TileSource::Remote, [height, width, channels]);
        report.tiles_used = placed.len();

        info!(
            tiles = report.tiles_used,
            height,
            width,
            channels,
            "Merged remote tiles into mosaic"
        );

        let mosaic = EmbeddingMosaic::new([height, width, channels], data, transform)?;
        Ok((mosaic, report))
    }
}
