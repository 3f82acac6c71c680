//! Species finder configuration.
//!
//! Built from environment variables by default, or from a YAML file whose
//! missing keys fall back to defaults. Command-line flags are applied last
//! in `main`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use embedding_store::{MosaicConfig, TileStoreConfig};
use geo_common::BoundingBox;
use scoring::ScoringConfig;

use crate::error::{FinderError, FinderResult};

/// GBIF caps occurrence search pages at this size.
pub const GBIF_MAX_PAGE_SIZE: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    pub tiles: TileStoreConfig,
    pub mosaic: MosaicConfig,
    pub scoring: ScoringConfig,
    pub gbif: GbifConfig,

    /// Embedding year.
    pub year: i32,

    /// Dense per-pixel scoring or a sparse grid at `scoring.grid_resolution`.
    pub mode: ScoringMode,

    /// Directory receiving the raster and GeoJSON outputs.
    pub output_dir: PathBuf,

    /// Named regions usable instead of an explicit bbox.
    pub regions: BTreeMap<String, RegionPreset>,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            tiles: TileStoreConfig::default(),
            mosaic: MosaicConfig::default(),
            scoring: ScoringConfig::default(),
            gbif: GbifConfig::default(),
            year: 2024,
            mode: ScoringMode::Dense,
            output_dir: PathBuf::from("output"),
            regions: builtin_regions(),
        }
    }
}

/// Which scoring path produces the probability surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Every native mosaic pixel.
    #[default]
    Dense,
    /// A regular sample grid over the region.
    Grid,
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::Dense => write!(f, "dense"),
            ScoringMode::Grid => write!(f, "grid"),
        }
    }
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dense" => Ok(ScoringMode::Dense),
            "grid" => Ok(ScoringMode::Grid),
            other => Err(format!("unknown scoring mode '{}' (expected dense or grid)", other)),
        }
    }
}

/// GBIF HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GbifConfig {
    pub base_url: String,
    pub page_size: usize,
    pub timeout_secs: u64,
    /// Retries per request after the first attempt.
    pub max_retries: u32,
    /// First retry delay; doubles on each retry.
    pub initial_retry_delay_ms: u64,
}

impl Default for GbifConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gbif.org/v1".to_string(),
            page_size: GBIF_MAX_PAGE_SIZE,
            timeout_secs: 30,
            max_retries: 3,
            initial_retry_delay_ms: 500,
        }
    }
}

/// A named bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPreset {
    /// `[min_lon, min_lat, max_lon, max_lat]`.
    pub bbox: [f64; 4],
    #[serde(default)]
    pub description: String,
}

fn builtin_regions() -> BTreeMap<String, RegionPreset> {
    let mut regions = BTreeMap::new();
    regions.insert(
        "cambridge".to_string(),
        RegionPreset {
            bbox: [0.03, 52.13, 0.22, 52.29],
            description: "Cambridge, UK test region".to_string(),
        },
    );
    regions
}

impl FinderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            tiles: TileStoreConfig::from_env(),
            mosaic: MosaicConfig::from_env(),
            scoring: ScoringConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("GBIF_BASE_URL") {
            config.gbif.base_url = val;
        }

        if let Ok(val) = std::env::var("FINDER_YEAR") {
            if let Ok(year) = val.parse() {
                config.year = year;
            }
        }

        if let Ok(val) = std::env::var("FINDER_MODE") {
            if let Ok(mode) = val.parse() {
                config.mode = mode;
            }
        }

        if let Ok(val) = std::env::var("FINDER_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        config
    }

    /// Load configuration from a YAML file. Regions listed in the file are
    /// added to the built-in presets, replacing any with the same name.
    pub fn from_yaml_file(path: &Path) -> FinderResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
            .map_err(|e| FinderError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: FinderConfig = serde_yaml::from_str(text)?;
        let mut regions = builtin_regions();
        regions.append(&mut config.regions);
        config.regions = regions;
        Ok(config)
    }

    /// Look up a region preset by name (case-insensitive).
    pub fn region(&self, name: &str) -> FinderResult<BoundingBox> {
        let preset = self.regions.get(&name.to_lowercase()).ok_or_else(|| {
            FinderError::Config(format!(
                "unknown region '{}'; known regions: {}",
                name,
                self.regions.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        let [min_lon, min_lat, max_lon, max_lat] = preset.bbox;
        BoundingBox::try_new(min_lon, min_lat, max_lon, max_lat)
            .map_err(|e| FinderError::Config(format!("region '{}': {}", name, e)))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> FinderResult<()> {
        self.tiles.validate().map_err(FinderError::Config)?;
        self.mosaic.validate().map_err(FinderError::Config)?;
        self.scoring.validate().map_err(FinderError::Config)?;

        if self.gbif.page_size == 0 || self.gbif.page_size > GBIF_MAX_PAGE_SIZE {
            return Err(FinderError::Config(format!(
                "gbif.page_size must be in 1..={}",
                GBIF_MAX_PAGE_SIZE
            )));
        }

        Ok(())
    }
}
