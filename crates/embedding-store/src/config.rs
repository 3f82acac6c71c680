//! Configuration for the tile store and mosaic loader.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use geo_common::{TileGrid, TILE_OFFSET, TILE_STEP};

/// Configuration for the local quantized tile cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileStoreConfig {
    /// Root of the cache: `{cache_root}/{year}/grid_{lon}_{lat}/...`.
    pub cache_root: PathBuf,

    /// Tile edge length in degrees.
    pub tile_step: f64,

    /// Offset of tile corners from multiples of `tile_step`.
    pub tile_offset: f64,

    /// Worker threads for parallel tile loads (0 = rayon default).
    pub parallel_loads: usize,
}

impl Default for TileStoreConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("global_0.1_degree_representation"),
            tile_step: TILE_STEP,
            tile_offset: TILE_OFFSET,
            parallel_loads: 0,
        }
    }
}

impl TileStoreConfig {
    /// Config rooted at `cache_root` with default grid settings.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TILE_CACHE_DIR") {
            config.cache_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TILE_PARALLEL_LOADS") {
            if let Ok(n) = val.parse() {
                config.parallel_loads = n;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.tile_step > 0.0) {
            return Err("tile_step must be > 0".to_string());
        }

        if self.tile_offset < 0.0 || self.tile_offset >= self.tile_step {
            return Err("tile_offset must be in [0, tile_step)".to_string());
        }

        // Keys are stored in hundredths of a degree.
        let centi = self.tile_step * 100.0;
        if (centi - centi.round()).abs() > 1e-6 {
            return Err("tile_step must be a multiple of 0.01".to_string());
        }

        Ok(())
    }

    /// The tile grid described by this configuration.
    pub fn tile_grid(&self) -> TileGrid {
        TileGrid::new(self.tile_step, self.tile_offset)
    }
}

/// Configuration for the single-file mosaic artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicConfig {
    /// Optional GeoTIFF holding a previously assembled mosaic.
    pub artifact_path: Option<PathBuf>,

    /// Write the artifact after assembling a mosaic from remote tiles.
    pub write_artifact: bool,
}

impl MosaicConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MOSAIC_ARTIFACT_PATH") {
            if !val.is_empty() {
                config.artifact_path = Some(PathBuf::from(val));
                config.write_artifact = true;
            }
        }

        if let Ok(val) = std::env::var("MOSAIC_WRITE_ARTIFACT") {
            config.write_artifact = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.write_artifact && self.artifact_path.is_none() {
            return Err("write_artifact requires artifact_path".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TileStoreConfig::default();
        assert_eq!(config.tile_step, 0.1);
        assert_eq!(config.tile_offset, 0.05);
        assert_eq!(config.parallel_loads, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TileStoreConfig::default();
        config.tile_step = 0.0;
        assert!(config.validate().is_err());

        config = TileStoreConfig::default();
        config.tile_offset = 0.1;
        assert!(config.validate().is_err());

        config = TileStoreConfig::default();
        config.tile_step = 0.125;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mosaic_config_validation() {
        let mut config = MosaicConfig::default();
        assert!(config.validate().is_ok());

        config.write_artifact = true;
        assert!(config.validate().is_err());

        config.artifact_path = Some(PathBuf::from("/tmp/mosaic.tif"));
        assert!(config.validate().is_ok());
    }
}
