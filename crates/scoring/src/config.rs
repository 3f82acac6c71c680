//! Scoring configuration.

use serde::{Deserialize, Serialize};

/// Tunables for training and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Pixels classified per chunk in dense mode.
    pub batch_size: usize,

    /// Minimum probability for a pixel to become a candidate.
    pub threshold: f32,

    /// Spacing of the sparse sample grid, in degrees.
    pub grid_resolution: f64,

    /// Background samples drawn per valid occurrence.
    pub negative_ratio: usize,

    /// Upper bound on candidates written to GeoJSON.
    pub max_candidates: usize,

    /// Seed for background sampling, holdout selection and candidate
    /// subsampling.
    pub seed: u64,

    /// Share of occurrences held out of training for evaluation; 0 disables
    /// evaluation.
    pub holdout_fraction: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            batch_size: 15_000,
            threshold: 0.5,
            grid_resolution: 0.005,
            negative_ratio: 5,
            max_candidates: 5_000,
            seed: 42,
            holdout_fraction: 0.2,
        }
    }
}

impl ScoringConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCORING_BATCH_SIZE") {
            if let Ok(n) = val.parse() {
                config.batch_size = n;
            }
        }

        if let Ok(val) = std::env::var("SCORING_THRESHOLD") {
            if let Ok(t) = val.parse() {
                config.threshold = t;
            }
        }

        if let Ok(val) = std::env::var("SCORING_GRID_RESOLUTION") {
            if let Ok(r) = val.parse() {
                config.grid_resolution = r;
            }
        }

        if let Ok(val) = std::env::var("SCORING_NEGATIVE_RATIO") {
            if let Ok(n) = val.parse() {
                config.negative_ratio = n;
            }
        }

        if let Ok(val) = std::env::var("SCORING_MAX_CANDIDATES") {
            if let Ok(n) = val.parse() {
                config.max_candidates = n;
            }
        }

        if let Ok(val) = std::env::var("SCORING_SEED") {
            if let Ok(s) = val.parse() {
                config.seed = s;
            }
        }

        if let Ok(val) = std::env::var("SCORING_HOLDOUT_FRACTION") {
            if let Ok(f) = val.parse() {
                config.holdout_fraction = f;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold must be in [0, 1], got {}", self.threshold));
        }

        if !(self.grid_resolution > 0.0) || !self.grid_resolution.is_finite() {
            return Err("grid_resolution must be a positive number".to_string());
        }

        if self.negative_ratio == 0 {
            return Err("negative_ratio must be > 0".to_string());
        }

        if !(0.0..1.0).contains(&self.holdout_fraction) {
            return Err(format!(
                "holdout_fraction must be in [0, 1), got {}",
                self.holdout_fraction
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScoringConfig::default();
        assert_eq!(config.batch_size, 15_000);
        assert_eq!(config.negative_ratio, 5);
        assert_eq!(config.max_candidates, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ScoringConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.grid_resolution = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.negative_ratio = 0;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.holdout_fraction = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ScoringConfig {
            threshold: 0.7,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ScoringConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
