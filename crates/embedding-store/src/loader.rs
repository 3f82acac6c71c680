//! Mosaic loading pipeline.
//!
//! ```text
//!  TryArtifact ──hit──────────────────────────────▶ Done
//!      │ miss
//!      ▼
//!  TryLocal ────hit (≥1 tile)─────────────────────▶ Done
//!      │ miss
//!      ▼
//!  TryRemote ───tiles──▶ CacheWrite (artifact) ───▶ Done
//!      │ no fetcher / no tiles
//!      ▼
//!  DataUnavailable
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};

use geo_common::BoundingBox;

use crate::config::MosaicConfig;
use crate::error::{EmbeddingError, Result};
use crate::mosaic::{EmbeddingMosaic, MosaicBuilder};
use crate::raster;
use crate::remote::RemoteTileFetcher;
use crate::store::TileStore;
use crate::types::{BuildReport, TileSource};

/// Tolerance when checking that an artifact covers a requested bbox.
const COVERAGE_TOLERANCE: f64 = 1e-6;

/// A mosaic ready for sampling, with how it was obtained.
#[derive(Debug, Clone)]
pub struct LoadedMosaic {
    pub mosaic: Arc<EmbeddingMosaic>,
    pub report: BuildReport,
}

enum LoadState {
    TryArtifact,
    TryLocal,
    TryRemote,
    CacheWrite(EmbeddingMosaic, BuildReport),
    Done(EmbeddingMosaic, BuildReport),
}

/// Loads the embedding mosaic for a region from the best available source.
pub struct MosaicLoader {
    store: TileStore,
    config: MosaicConfig,
}

impl MosaicLoader {
    pub fn new(store: TileStore, config: MosaicConfig) -> Result<Self> {
        config.validate().map_err(EmbeddingError::Config)?;
        Ok(Self { store, config })
    }

    /// Load the mosaic covering `bbox` for `year`.
    ///
    /// The remote fetcher is only consulted when neither the artifact nor
    /// the local cache has data.
    pub fn load(
        &self,
        bbox: &BoundingBox,
        year: i32,
        fetcher: Option<&dyn RemoteTileFetcher>,
    ) -> Result<LoadedMosaic> {
        bbox.validate()?;

        let mut state = LoadState::TryArtifact;
        loop {
            state = match state {
                LoadState::TryArtifact => match self.try_artifact(bbox, year)? {
                    Some(mosaic) => {
                        let report = BuildReport::new(TileSource::Artifact, mosaic.shape());
                        LoadState::Done(mosaic, report)
                    }
                    None => LoadState::TryLocal,
                },

                LoadState::TryLocal => {
                    let load = self.store.load_bbox(bbox, year)?;
                    if load.is_empty() {
                        debug!(year, misses = load.cache_misses, "No local tiles");
                        LoadState::TryRemote
                    } else {
                        let (mosaic, report) = MosaicBuilder::from_grid_tiles(
                            load.tiles,
                            self.store.config().tile_step,
                            bbox,
                            year,
                        )?;
                        LoadState::Done(mosaic, report)
                    }
                }

                LoadState::TryRemote => {
                    let Some(fetcher) = fetcher else {
                        warn!(year, "No local tiles and no remote fetcher configured");
                        return Err(EmbeddingError::data_unavailable(bbox, year));
                    };
                    info!(year, "Fetching tiles from remote source");
                    let tiles = fetcher.fetch(bbox, year)?;
                    let (mosaic, report) = MosaicBuilder::from_remote_tiles(tiles, bbox, year)?;
                    LoadState::CacheWrite(mosaic, report)
                }

                LoadState::CacheWrite(mosaic, report) => {
                    if self.config.write_artifact {
                        if let Some(path) = &self.config.artifact_path {
                            // The mosaic is still usable if the cache write fails.
                            if let Err(e) = raster::write_mosaic(path, &mosaic, year) {
                                warn!(error = %e, path = %path.display(), "Failed to write mosaic artifact");
                            }
                        }
                    }
                    LoadState::Done(mosaic, report)
                }

                LoadState::Done(mosaic, report) => {
                    info!(
                        source = %report.source,
                        shape = ?report.shape,
                        "Mosaic ready"
                    );
                    return Ok(LoadedMosaic {
                        mosaic: Arc::new(mosaic),
                        report,
                    });
                }
            };
        }
    }

    fn try_artifact(&self, bbox: &BoundingBox, year: i32) -> Result<Option<EmbeddingMosaic>> {
        let Some(path) = self.config.artifact_path.as_deref() else {
            return Ok(None);
        };
        if !path.exists() {
            debug!(path = %path.display(), "No mosaic artifact");
            return Ok(None);
        }

        let artifact = raster::read_mosaic(path)?;
        if artifact.year != Some(year) {
            info!(
                path = %path.display(),
                artifact_year = ?artifact.year,
                year,
                "Mosaic artifact is for a different year"
            );
            return Ok(None);
        }
        if covers(&artifact.mosaic, bbox) {
            Ok(Some(artifact.mosaic))
        } else {
            info!(
                path = %path.display(),
                artifact = %artifact.mosaic.bounds(),
                "Mosaic artifact does not cover the requested region"
            );
            Ok(None)
        }
    }
}

fn covers(mosaic: &EmbeddingMosaic, bbox: &BoundingBox) -> bool {
    let b = mosaic.bounds().expand(COVERAGE_TOLERANCE);
    b.contains(bbox.min_lon, bbox.min_lat) && b.contains(bbox.max_lon, bbox.max_lat)
}
