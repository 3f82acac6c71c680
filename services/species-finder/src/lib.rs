//! Species habitat candidate finder.
//!
//! Given a species name and a region, pulls georeferenced occurrences from
//! GBIF, trains a presence/background classifier on the embedding vectors at
//! those points and scores every pixel of the region's embedding mosaic.
//!
//! ```text
//! GBIF ──► occurrences ──┐
//!                        ├──► TrainingSet ──► LogisticModel ──► ProbabilitySurface
//! MosaicLoader ──► mosaic┘                                             │
//!                                                                      ▼
//!                                          probability.tif, candidates.geojson
//! ```

pub mod config;
pub mod error;
pub mod gbif;
pub mod output;
pub mod pipeline;

pub use config::{FinderConfig, GbifConfig, RegionPreset, ScoringMode};
pub use error::{FinderError, FinderResult};
pub use gbif::{GbifClient, Occurrence, OccurrenceSource, Taxon};
pub use output::{write_outputs, OutputOptions, OutputPaths};
pub use pipeline::{Finder, PredictionResult, MIN_OCCURRENCES};
