//! Writes a run's products to disk.
//!
//! - `probability.tif`: float32 probability surface, NaN no-data
//! - `candidates.geojson`: pixels at or above the threshold, capped
//! - `occurrences.geojson`: the occurrences used for training
//! - `summary.json`: run parameters, counts and holdout evaluation

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use embedding_store::TileSource;
use scoring::{subsample_candidates, Evaluation, FeatureCollection, RunMetadata, SurfaceStats};

use crate::config::ScoringMode;
use crate::error::FinderResult;
use crate::pipeline::PredictionResult;

/// Output selection and candidate filtering.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub threshold: f32,
    pub max_candidates: usize,
    pub seed: u64,
    pub write_summary: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub probability: PathBuf,
    pub candidates: PathBuf,
    pub occurrences: PathBuf,
    pub summary: Option<PathBuf>,
    /// Candidates written, after capping.
    pub n_candidates: usize,
    /// Candidates at or above the threshold before capping.
    pub n_above_threshold: usize,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    species: &'a str,
    scientific_name: &'a str,
    taxon_key: u64,
    year: i32,
    bbox: [f64; 4],
    mode: ScoringMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    grid_resolution: Option<f64>,
    occurrences_found: usize,
    occurrences_used: usize,
    occurrences_trained: usize,
    background_samples: usize,
    mosaic_shape: [usize; 3],
    mosaic_source: TileSource,
    threshold: f32,
    candidates_above_threshold: usize,
    candidates_written: usize,
    surface: SurfaceStats,
    evaluation: Option<Evaluation>,
    generated_at: String,
}

/// Write every output of `result` into `dir`, creating it if needed.
pub fn write_outputs(
    result: &PredictionResult,
    dir: &Path,
    options: &OutputOptions,
) -> FinderResult<OutputPaths> {
    std::fs::create_dir_all(dir)?;

    let probability = dir.join("probability.tif");
    result.surface.write_tiff(&probability)?;
    info!(path = %probability.display(), "Saved probability raster");

    let above = result.surface.candidates(options.threshold);
    let n_above_threshold = above.len();
    let selected = subsample_candidates(&above, options.max_candidates, options.seed);
    if selected.len() < n_above_threshold {
        info!(
            total = n_above_threshold,
            kept = selected.len(),
            "Subsampled candidates"
        );
    }

    let candidates = dir.join("candidates.geojson");
    FeatureCollection::from_candidates(&selected)
        .with_metadata(RunMetadata {
            species: result.taxon.canonical_name.clone(),
            taxon_key: result.taxon.key,
            n_occurrences: result.occurrences.len(),
            n_candidates: selected.len(),
            threshold: options.threshold,
            bbox: result.bbox.to_array(),
        })
        .write_to(&candidates, false)?;
    info!(path = %candidates.display(), count = selected.len(), "Saved candidates");

    let occurrences = dir.join("occurrences.geojson");
    FeatureCollection::from_points(&result.occurrences).write_to(&occurrences, true)?;
    info!(path = %occurrences.display(), count = result.occurrences.len(), "Saved occurrences");

    let summary = if options.write_summary {
        let path = dir.join("summary.json");
        let summary = RunSummary {
            species: &result.taxon.canonical_name,
            scientific_name: &result.taxon.scientific_name,
            taxon_key: result.taxon.key,
            year: result.year,
            bbox: result.bbox.to_array(),
            mode: result.mode,
            grid_resolution: result.grid_resolution,
            occurrences_found: result.n_found,
            occurrences_used: result.occurrences.len(),
            occurrences_trained: result.n_trained,
            background_samples: result.n_background,
            mosaic_shape: result.mosaic_report.shape,
            mosaic_source: result.mosaic_report.source,
            threshold: options.threshold,
            candidates_above_threshold: n_above_threshold,
            candidates_written: selected.len(),
            surface: result.stats,
            evaluation: result.evaluation,
            generated_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&summary).map_err(std::io::Error::from)?;
        std::fs::write(&path, json)?;
        Some(path)
    } else {
        None
    };

    Ok(OutputPaths {
        probability,
        candidates,
        occurrences,
        summary,
        n_candidates: selected.len(),
        n_above_threshold,
    })
}
