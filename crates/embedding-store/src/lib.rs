//! Embedding tile cache, mosaic assembly and point sampling.
//!
//! Embeddings are precomputed per-pixel feature vectors distributed as
//! 0.1° tiles. This crate reads quantized tiles from a local cache (or
//! accepts georegistered tiles from an injected remote source), stitches them
//! into one north-up raster and samples it at arbitrary coordinates.
//!
//! - **Explicit configuration**: [`TileStoreConfig`] is passed to
//!   [`TileStore::new`]; there is no global cache path
//! - **Partial coverage**: missing tiles become zero blocks, ragged tiles
//!   are cropped and counted in [`BuildReport`]
//! - **No-data is not an error**: points outside the mosaic come back with
//!   `valid = false`
//!
//! # Architecture
//!
//! ```text
//! MosaicLoader::load(bbox, year, fetcher)
//!      │
//!      ├─► Artifact GeoTIFF for year covers bbox? ──► read_mosaic
//!      │
//!      ├─► TileStore::load_bbox (parallel .npy reads, dequantize)
//!      │         │
//!      │         └─► MosaicBuilder::from_grid_tiles
//!      │
//!      └─► RemoteTileFetcher::fetch
//!                │
//!                └─► MosaicBuilder::from_remote_tiles ──► write_mosaic
//!                          │
//!                          ▼
//!                  Arc<EmbeddingMosaic>
//!                          │
//!                          ▼
//!          sample_at_points / all_pixel_embeddings
//! ```
//!
//! # Example
//!
//! ```ignore
//! use embedding_store::{MosaicConfig, MosaicLoader, TileStore, TileStoreConfig};
//! use geo_common::{BoundingBox, SamplePoint};
//!
//! let store = TileStore::new(TileStoreConfig::new("/data/embeddings"))?;
//! let loader = MosaicLoader::new(store, MosaicConfig::default())?;
//!
//! let bbox = BoundingBox::new(0.03, 52.13, 0.22, 52.29);
//! let loaded = loader.load(&bbox, 2024, None)?;
//!
//! let batch = loaded.mosaic.sample_at_points(&[SamplePoint::new(0.12, 52.2)]);
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod mosaic;
pub mod npy;
pub mod quantized;
pub mod raster;
pub mod remote;
pub mod store;
pub mod types;

pub use config::{MosaicConfig, TileStoreConfig};
pub use error::{EmbeddingError, Result};
pub use loader::{LoadedMosaic, MosaicLoader};
pub use mosaic::{EmbeddingMosaic, MosaicBuilder};
pub use quantized::QuantizedTile;
pub use raster::{
    read_float_pages, read_mosaic, write_float_raster, write_mosaic, FloatRaster, MosaicArtifact,
};
pub use remote::{RemoteTile, RemoteTileFetcher, RemoteTileIter};
pub use store::{TilePaths, TileStore};
pub use types::{
    BuildReport, EmbeddingTile, PixelEmbeddings, SampleBatch, SampleResult, TileLoad, TileSource,
};
