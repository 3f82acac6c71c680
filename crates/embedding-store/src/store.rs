//! Read-only access to the local quantized tile cache.
//!
//! Layout on disk:
//!
//! ```text
//! {cache_root}/{year}/grid_{lon:.2}_{lat:.2}/grid_{lon:.2}_{lat:.2}.npy
//! {cache_root}/{year}/grid_{lon:.2}_{lat:.2}/grid_{lon:.2}_{lat:.2}_scales.npy
//! ```

use rayon::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

use geo_common::{BoundingBox, GridCellKey, TileGrid};

use crate::config::TileStoreConfig;
use crate::error::{EmbeddingError, Result};
use crate::quantized::QuantizedTile;
use crate::types::{EmbeddingTile, TileLoad};

/// Paths of the two files that make up one cached tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePaths {
    pub data: PathBuf,
    pub scales: PathBuf,
}

/// Loader for cached embedding tiles.
pub struct TileStore {
    config: TileStoreConfig,
    grid: TileGrid,
    pool: Option<rayon::ThreadPool>,
}

impl TileStore {
    pub fn new(config: TileStoreConfig) -> Result<Self> {
        config.validate().map_err(EmbeddingError::Config)?;

        let pool = if config.parallel_loads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.parallel_loads)
                .thread_name(|i| format!("tile-load-{}", i))
                .build()
                .map_err(|e| EmbeddingError::Config(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            grid: config.tile_grid(),
            config,
            pool,
        })
    }

    pub fn config(&self) -> &TileStoreConfig {
        &self.config
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Every tile key whose footprint intersects `bbox`.
    pub fn keys_for_bbox(&self, bbox: &BoundingBox) -> Vec<GridCellKey> {
        self.grid.keys_for_bbox(bbox)
    }

    pub fn tile_paths(&self, key: &GridCellKey, year: i32) -> TilePaths {
        let name = key.tile_name();
        let dir = self
            .config
            .cache_root
            .join(year.to_string())
            .join(&name);
        TilePaths {
            data: dir.join(format!("{}.npy", name)),
            scales: dir.join(format!("{}_scales.npy", name)),
        }
    }

    /// Load one tile.
    ///
    /// Returns `Ok(None)` when the data file does not exist. A data file
    /// without its scale file, or either file failing to decode, is a
    /// [`EmbeddingError::CacheCorrupt`].
    pub fn load_tile(&self, key: &GridCellKey, year: i32) -> Result<Option<QuantizedTile>> {
        let paths = self.tile_paths(key, year);

        let data = match fs::read(&paths.data) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(tile = %key, "Tile not in cache");
                return Ok(None);
            }
            Err(e) => return Err(EmbeddingError::cache_corrupt(key, e.to_string())),
        };

        let scales = match fs::read(&paths.scales) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EmbeddingError::cache_corrupt(key, "scale file missing"))
            }
            Err(e) => return Err(EmbeddingError::cache_corrupt(key, e.to_string())),
        };

        QuantizedTile::from_npy(&data, &scales)
            .map(Some)
            .map_err(|e| EmbeddingError::from_npy(key, e))
    }

    fn load_dequantized(&self, key: &GridCellKey, year: i32) -> Result<Option<EmbeddingTile>> {
        Ok(self
            .load_tile(key, year)?
            .map(|tile| EmbeddingTile::new(*key, tile.shape(), tile.dequantize())))
    }

    /// Load and dequantize every cached tile intersecting `bbox`.
    ///
    /// Tiles are read in parallel; the result is in key order regardless of
    /// completion order. The first corrupt tile aborts the load.
    #[instrument(skip(self, bbox), fields(bbox = %bbox))]
    pub fn load_bbox(&self, bbox: &BoundingBox, year: i32) -> Result<TileLoad> {
        let keys = self.keys_for_bbox(bbox);

        let load_all = || -> Vec<Result<Option<EmbeddingTile>>> {
            keys.par_iter()
                .map(|key| self.load_dequantized(key, year))
                .collect()
        };
        let loaded = match &self.pool {
            Some(pool) => pool.install(load_all),
            None => load_all(),
        };

        let mut load = TileLoad {
            keys_requested: keys.len(),
            ..TileLoad::default()
        };
        for result in loaded {
            match result? {
                Some(tile) => load.tiles.push(tile),
                None => load.cache_misses += 1,
            }
        }
        load.tiles_loaded = load.tiles.len();

        info!(
            year,
            requested = load.keys_requested,
            loaded = load.tiles_loaded,
            misses = load.cache_misses,
            "Loaded tiles from local cache"
        );

        Ok(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(root: &std::path::Path) -> TileStore {
        TileStore::new(TileStoreConfig::new(root)).unwrap()
    }

    #[test]
    fn test_tile_paths() {
        let store = store_at(std::path::Path::new("/cache"));
        let paths = store.tile_paths(&GridCellKey::new(0.15, 52.05), 2024);
        assert_eq!(
            paths.data,
            PathBuf::from("/cache/2024/grid_0.15_52.05/grid_0.15_52.05.npy")
        );
        assert_eq!(
            paths.scales,
            PathBuf::from("/cache/2024/grid_0.15_52.05/grid_0.15_52.05_scales.npy")
        );
    }

    #[test]
    fn test_missing_tile_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path());
        let result = store.load_tile(&GridCellKey::new(0.05, 52.05), 2024).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_missing_scale_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path());
        let key = GridCellKey::new(0.05, 52.05);
        let paths = store.tile_paths(&key, 2024);

        fs::create_dir_all(paths.data.parent().unwrap()).unwrap();
        fs::write(&paths.data, crate::npy::encode_i8(&[1, 1, 1], &[3]).unwrap()).unwrap();

        let err = store.load_tile(&key, 2024).unwrap_err();
        assert!(matches!(err, EmbeddingError::CacheCorrupt { .. }));
        assert!(err.to_string().contains("grid_0.05_52.05"));
    }

    #[test]
    fn test_overflowing_shape_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path());
        let key = GridCellKey::new(0.05, 52.05);
        let paths = store.tile_paths(&key, 2024);

        let header = "{'descr': '|i1', 'fortran_order': False, 'shape': (4294967296, 4294967296, 2), }\n";
        let mut data = b"\x93NUMPY\x01\x00".to_vec();
        data.extend_from_slice(&(header.len() as u16).to_le_bytes());
        data.extend_from_slice(header.as_bytes());
        data.extend_from_slice(&[1; 16]);

        fs::create_dir_all(paths.data.parent().unwrap()).unwrap();
        fs::write(&paths.data, data).unwrap();
        fs::write(&paths.scales, crate::npy::encode_f32(&[], &[1.0]).unwrap()).unwrap();

        let err = store.load_tile(&key, 2024).unwrap_err();
        assert!(matches!(err, EmbeddingError::CacheCorrupt { .. }));
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = TileStoreConfig::default();
        config.tile_step = -1.0;
        assert!(matches!(
            TileStore::new(config),
            Err(EmbeddingError::Config(_))
        ));
    }
}
