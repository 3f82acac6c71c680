//! Probability surfaces and candidate extraction.

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use embedding_store::write_float_raster;
use geo_common::{BoundingBox, GeoTransform};

use crate::error::{Result, ScoringError};

/// A location whose probability met the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub lon: f64,
    pub lat: f64,
    pub probability: f32,
}

/// Summary of the classified cells of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceStats {
    /// Cells holding a probability (not NaN).
    pub valid: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    /// Valid cells strictly above the reference threshold.
    pub above: usize,
}

/// Row-major (H, W) probabilities located by a transform.
///
/// NaN marks cells without data; 0.0 is a classified, low-probability cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilitySurface {
    values: Vec<f32>,
    height: usize,
    width: usize,
    transform: GeoTransform,
}

impl ProbabilitySurface {
    pub fn new(values: Vec<f32>, height: usize, width: usize, transform: GeoTransform) -> Result<Self> {
        if values.len() != height * width {
            return Err(ScoringError::dimension_mismatch(height * width, values.len()));
        }
        Ok(Self {
            values,
            height,
            width,
            transform,
        })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Shape as (H, W).
    pub fn shape(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.height || col >= self.width {
            return None;
        }
        Some(self.values[row * self.width + col])
    }

    /// Cells with probability `>= threshold`, located at pixel centres and
    /// sorted ascending by probability so the strongest draw last.
    pub fn candidates(&self, threshold: f32) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .values
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_nan() && **p >= threshold)
            .map(|(i, p)| {
                let (row, col) = (i / self.width, i % self.width);
                let (lon, lat) = self.transform.pixel_center(row as i64, col as i64);
                Candidate {
                    lon,
                    lat,
                    probability: *p,
                }
            })
            .collect();
        sort_candidates(&mut candidates);
        candidates
    }

    /// Value range and the number of cells above `threshold`.
    pub fn stats(&self, threshold: f32) -> SurfaceStats {
        let mut stats = SurfaceStats {
            valid: 0,
            min: None,
            max: None,
            above: 0,
        };
        for &p in self.values.iter().filter(|p| !p.is_nan()) {
            stats.valid += 1;
            stats.min = Some(stats.min.map_or(p, |m| m.min(p)));
            stats.max = Some(stats.max.map_or(p, |m| m.max(p)));
            if p > threshold {
                stats.above += 1;
            }
        }
        stats
    }

    /// The same surface with rows ordered north to south.
    ///
    /// Sparse-grid surfaces run south to north; rasters are written north-up.
    pub fn to_north_up(&self) -> ProbabilitySurface {
        if self.transform.pixel_height < 0.0 {
            return self.clone();
        }
        let values = self
            .values
            .chunks_exact(self.width.max(1))
            .rev()
            .flatten()
            .copied()
            .collect();
        let transform = GeoTransform::new(
            self.transform.origin_lon,
            self.transform.origin_lat + self.height as f64 * self.transform.pixel_height,
            self.transform.pixel_width,
            -self.transform.pixel_height,
        );
        ProbabilitySurface {
            values,
            height: self.height,
            width: self.width,
            transform,
        }
    }

    /// Write a single-band float32 GeoTIFF with `GDAL_NODATA = nan`.
    pub fn write_tiff(&self, path: &Path) -> Result<()> {
        let north_up = self.to_north_up();
        write_float_raster(
            path,
            &north_up.values,
            north_up.width,
            north_up.height,
            &north_up.transform,
        )?;
        Ok(())
    }
}

/// Ascending by probability; ties keep their order.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| a.probability.total_cmp(&b.probability));
}

/// At most `max` candidates, drawn without replacement when there are more,
/// then sorted ascending.
pub fn subsample_candidates(candidates: &[Candidate], max: usize, seed: u64) -> Vec<Candidate> {
    let mut selected: Vec<Candidate> = if candidates.len() > max {
        let mut rng = StdRng::seed_from_u64(seed);
        rand::seq::index::sample(&mut rng, candidates.len(), max)
            .into_iter()
            .map(|i| candidates[i])
            .collect()
    } else {
        candidates.to_vec()
    };
    sort_candidates(&mut selected);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding_store::read_float_pages;
    use test_utils::{assert_approx_eq, assert_coords_approx_eq};

    fn two_by_two() -> ProbabilitySurface {
        let transform = GeoTransform::from_bounds(0.0, 52.0, 0.2, 52.2, 2, 2);
        ProbabilitySurface::new(vec![0.2, 0.9, 0.95, f32::NAN], 2, 2, transform).unwrap()
    }

    #[test]
    fn test_candidates_threshold_and_order() {
        let candidates = two_by_two().candidates(0.5);
        let probs: Vec<f32> = candidates.iter().map(|c| c.probability).collect();
        assert_eq!(probs, vec![0.9, 0.95]);

        // 0.9 sits in pixel (0, 1), 0.95 in (1, 0).
        assert_coords_approx_eq!((candidates[0].lon, candidates[0].lat), (0.15, 52.15), 1e-9);
        assert_coords_approx_eq!((candidates[1].lon, candidates[1].lat), (0.05, 52.05), 1e-9);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let candidates = two_by_two().candidates(0.9);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let transform = GeoTransform::from_bounds(0.0, 0.0, 1.0, 1.0, 2, 2);
        assert!(ProbabilitySurface::new(vec![0.0; 3], 2, 2, transform).is_err());
    }

    #[test]
    fn test_stats_skip_nan() {
        let stats = two_by_two().stats(0.5);
        assert_eq!(stats.valid, 3);
        assert_eq!(stats.min, Some(0.2));
        assert_eq!(stats.max, Some(0.95));
        assert_eq!(stats.above, 2);
    }

    #[test]
    fn test_stats_of_all_nan_surface() {
        let transform = GeoTransform::from_bounds(0.0, 0.0, 1.0, 1.0, 1, 1);
        let surface = ProbabilitySurface::new(vec![f32::NAN], 1, 1, transform).unwrap();
        let stats = surface.stats(0.5);
        assert_eq!(stats.valid, 0);
        assert_eq!(stats.min, None);
    }

    #[test]
    fn test_to_north_up_flips_south_up_rows() {
        // Rows run south to north from lat 52.0 with 0.1 degree cells.
        let transform = GeoTransform::new(0.0, 52.0, 0.1, 0.1);
        let surface = ProbabilitySurface::new(vec![1.0, 2.0, 3.0, 4.0], 2, 2, transform).unwrap();
        let flipped = surface.to_north_up();

        assert_eq!(flipped.values(), &[3.0, 4.0, 1.0, 2.0]);
        assert_approx_eq!(flipped.transform().origin_lat, 52.2, 1e-12);
        assert!(flipped.transform().pixel_height < 0.0);
        assert_eq!(flipped.to_north_up(), flipped);
    }

    #[test]
    fn test_subsample_candidates() {
        let candidates: Vec<Candidate> = (0..100)
            .map(|i| Candidate {
                lon: i as f64,
                lat: 0.0,
                probability: 1.0 - i as f32 / 200.0,
            })
            .collect();

        let picked = subsample_candidates(&candidates, 10, 42);
        assert_eq!(picked.len(), 10);
        assert!(picked.windows(2).all(|w| w[0].probability <= w[1].probability));
        assert_eq!(picked, subsample_candidates(&candidates, 10, 42));

        let all = subsample_candidates(&candidates, 500, 42);
        assert_eq!(all.len(), 100);
        assert_eq!(all[0].probability, 1.0 - 99.0 / 200.0);
    }

    #[test]
    fn test_write_tiff_keeps_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probability.tif");
        two_by_two().write_tiff(&path).unwrap();

        let raster = read_float_pages(&path).unwrap();
        assert_eq!((raster.width, raster.height), (2, 2));
        assert_eq!(raster.bands.len(), 1);
        assert_eq!(&raster.bands[0][..3], &[0.2, 0.9, 0.95]);
        assert!(raster.bands[0][3].is_nan());
    }
}
