//! GeoJSON output for candidates and occurrences.
//!
//! Collections are plain Point features. Candidate features carry a
//! `probability` property; the collection may carry a `metadata` member
//! describing the run that produced it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use geo_common::SamplePoint;

use crate::error::Result;
use crate::surface::Candidate;

/// A GeoJSON FeatureCollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<Feature>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            features: Vec::new(),
            metadata: None,
        }
    }

    /// One feature per candidate, in the given order.
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        Self::new().with_features(
            candidates
                .iter()
                .map(|c| Feature::point(c.lon, c.lat).with_probability(c.probability))
                .collect(),
        )
    }

    /// Bare point features, e.g. occurrences.
    pub fn from_points(points: &[SamplePoint]) -> Self {
        Self::new().with_features(points.iter().map(|p| Feature::point(p.lon, p.lat)).collect())
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features.extend(features);
        self
    }

    pub fn with_metadata(mut self, metadata: RunMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Serialize to `path`, pretty-printed if `pretty`.
    pub fn write_to(&self, path: &Path, pretty: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        if pretty {
            serde_json::to_writer_pretty(&mut writer, self)?;
        } else {
            serde_json::to_writer(&mut writer, self)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    pub geometry: Geometry,

    pub properties: FeatureProperties,
}

impl Feature {
    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            type_: "Feature".to_string(),
            geometry: Geometry::Point {
                coordinates: [lon, lat],
            },
            properties: FeatureProperties::default(),
        }
    }

    pub fn with_probability(mut self, probability: f32) -> Self {
        self.properties.probability = Some(probability);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        /// Coordinates as [longitude, latitude].
        coordinates: [f64; 2],
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f32>,
}

/// Provenance of a candidate collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    pub species: String,
    pub taxon_key: u64,
    pub n_occurrences: usize,
    pub n_candidates: usize,
    pub threshold: f32,
    /// `[min_lon, min_lat, max_lon, max_lat]`.
    pub bbox: [f64; 4],
}
