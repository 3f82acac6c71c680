//! On-disk tile cache fixtures.

use embedding_store::{QuantizedTile, TileStore, TileStoreConfig};
use geo_common::GridCellKey;
use tempfile::TempDir;

/// A tile cache in a temporary directory, removed on drop.
///
/// ```ignore
/// let cache = TileCacheFixture::new(2024);
/// cache.write_tile(0.05, 52.05, [10, 10, 4], &split_habitat_tile([10, 10, 4], 5));
/// let store = TileStore::new(cache.store_config()).unwrap();
/// ```
pub struct TileCacheFixture {
    dir: TempDir,
    year: i32,
}

impl TileCacheFixture {
    pub fn new(year: i32) -> Self {
        Self {
            dir: tempfile::Builder::new()
                .prefix("tile_cache_")
                .tempdir()
                .expect("failed to create tile cache directory"),
            year,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Store configuration rooted at this cache.
    pub fn store_config(&self) -> TileStoreConfig {
        TileStoreConfig::new(self.dir.path())
    }

    /// Quantize `values` (row-major H, W, C) and write the tile whose SW
    /// corner is `(lon, lat)`. Returns the tile as written.
    pub fn write_tile(&self, lon: f64, lat: f64, shape: [usize; 3], values: &[f32]) -> QuantizedTile {
        let tile = QuantizedTile::quantize(shape, values).expect("tile values match shape");
        let store = TileStore::new(self.store_config()).expect("valid store config");
        let paths = store.tile_paths(&GridCellKey::new(lon, lat), self.year);
        tile.write_to(&paths.data, &paths.scales)
            .expect("failed to write tile fixture");
        tile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::split_habitat_tile;

    #[test]
    fn test_fixture_tiles_load_back() {
        let cache = TileCacheFixture::new(2024);
        let values = split_habitat_tile([4, 4, 2], 2);
        let written = cache.write_tile(0.05, 52.05, [4, 4, 2], &values);
        assert_eq!(cache.year(), 2024);

        let store = TileStore::new(cache.store_config()).unwrap();
        let tile = store
            .load_tile(&GridCellKey::new(0.05, 52.05), 2024)
            .unwrap()
            .unwrap();
        assert_eq!(tile.shape(), [4, 4, 2]);
        assert_eq!(tile.dequantize(), written.dequantize());
        crate::assert_slice_approx_eq!(&tile.dequantize(), &values, 0.01);
    }

    #[test]
    fn test_cache_directory_is_removed_on_drop() {
        let cache = TileCacheFixture::new(2023);
        let root = cache.store_config().cache_root;
        assert!(root.exists());
        drop(cache);
        assert!(!root.exists());
    }
}
