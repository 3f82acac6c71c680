//! Species finder CLI.
//!
//! Finds candidate locations for a species:
//! - Resolves the name and fetches occurrences from GBIF
//! - Loads the embedding mosaic for the region from the tile cache
//! - Trains a presence/background classifier and scores every pixel, or a
//!   sample grid with `--mode grid`
//! - Reports holdout accuracy on occurrences kept out of training
//! - Writes a probability GeoTIFF and candidate GeoJSON

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use embedding_store::{MosaicLoader, TileStore};
use geo_common::BoundingBox;
use scoring::ScoringEngine;
use species_finder::{write_outputs, Finder, FinderConfig, GbifClient, OutputOptions, ScoringMode};

#[derive(Parser, Debug)]
#[command(name = "species-finder")]
#[command(about = "Find candidate habitat for a species from GBIF occurrences and embeddings")]
struct Args {
    /// Scientific name, e.g. "Quercus robur"
    species: String,

    /// Named region preset
    #[arg(long, default_value = "cambridge")]
    region: String,

    /// Explicit bbox "min_lon,min_lat,max_lon,max_lat" (overrides --region)
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Embedding year
    #[arg(long)]
    year: Option<i32>,

    /// Embedding tile cache directory
    #[arg(long, env = "TILE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Mosaic GeoTIFF reused when it covers the region
    #[arg(long, env = "MOSAIC_ARTIFACT")]
    artifact: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, env = "FINDER_CONFIG")]
    config: Option<PathBuf>,

    /// Candidate probability threshold
    #[arg(long)]
    threshold: Option<f32>,

    /// Background samples per occurrence
    #[arg(long)]
    negative_ratio: Option<usize>,

    /// Scoring mode: "dense" (every pixel) or "grid"
    #[arg(long)]
    mode: Option<ScoringMode>,

    /// Grid spacing in degrees for grid mode
    #[arg(long)]
    resolution: Option<f64>,

    /// Share of occurrences held out for evaluation (0 disables)
    #[arg(long)]
    holdout: Option<f64>,

    /// Skip summary.json
    #[arg(long)]
    no_summary: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);
    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let mut config = match &args.config {
        Some(path) => FinderConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FinderConfig::from_env(),
    };

    if let Some(dir) = args.cache_dir {
        config.tiles.cache_root = dir;
    }
    if let Some(path) = args.artifact {
        config.mosaic.artifact_path = Some(path);
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(year) = args.year {
        config.year = year;
    }
    if let Some(threshold) = args.threshold {
        config.scoring.threshold = threshold;
    }
    if let Some(ratio) = args.negative_ratio {
        config.scoring.negative_ratio = ratio;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(resolution) = args.resolution {
        config.scoring.grid_resolution = resolution;
    }
    if let Some(fraction) = args.holdout {
        config.scoring.holdout_fraction = fraction;
    }
    config.validate()?;

    let bbox = match args.bbox {
        Some(bbox) => bbox,
        None => config.region(&args.region)?,
    };

    info!(
        species = %args.species,
        bbox = %bbox,
        year = config.year,
        mode = %config.mode,
        "Starting species finder"
    );

    let store = TileStore::new(config.tiles.clone()).context("opening tile cache")?;
    let loader = MosaicLoader::new(store, config.mosaic.clone())?;
    let engine = ScoringEngine::new(config.scoring.clone())?;
    let gbif = Arc::new(GbifClient::new(config.gbif.clone())?);

    let finder = Finder::new(gbif, loader, engine).with_mode(config.mode);
    let result = finder
        .find_candidates(&args.species, bbox, config.year)
        .await
        .with_context(|| format!("finding candidates for {}", args.species))?;

    let options = OutputOptions {
        threshold: config.scoring.threshold,
        max_candidates: config.scoring.max_candidates,
        seed: config.scoring.seed,
        write_summary: !args.no_summary,
    };
    let paths = write_outputs(&result, &config.output_dir, &options)?;

    match &result.evaluation {
        Some(eval) => info!(
            accuracy = %format_args!("{:.3}", eval.accuracy),
            held_out = eval.n_positive,
            negatives = eval.n_negative,
            "Holdout accuracy"
        ),
        None => info!("No occurrences held out; skipped evaluation"),
    }

    info!(
        species = %result.taxon.canonical_name,
        occurrences = result.occurrences.len(),
        candidates = paths.n_candidates,
        above_threshold = paths.n_above_threshold,
        output = %config.output_dir.display(),
        "Done"
    );

    Ok(())
}
