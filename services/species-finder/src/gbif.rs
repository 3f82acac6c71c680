//! GBIF occurrence retrieval.
//!
//! Two endpoints are used:
//! - `GET /species/match?name=...` resolves a scientific name to a taxon key
//! - `GET /occurrence/search` pages through georeferenced occurrences inside
//!   a bbox, `page_size` records at a time

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use geo_common::{BoundingBox, SamplePoint};

use crate::config::GbifConfig;
use crate::error::{FinderError, FinderResult};

/// A resolved taxon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub key: u64,
    pub scientific_name: String,
    pub canonical_name: String,
}

/// Source of species occurrences.
#[async_trait]
pub trait OccurrenceSource: Send + Sync {
    /// Resolve a scientific name to a taxon.
    async fn match_species(&self, name: &str) -> FinderResult<Taxon>;

    /// All georeferenced occurrences of `taxon_key` inside `bbox`.
    async fn occurrences(&self, taxon_key: u64, bbox: &BoundingBox) -> FinderResult<Vec<Occurrence>>;
}

/// Response of `/species/match`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesMatch {
    pub usage_key: Option<u64>,
    pub scientific_name: Option<String>,
    pub canonical_name: Option<String>,
    #[serde(default)]
    pub match_type: String,
}

impl SpeciesMatch {
    /// The matched taxon, or `SpeciesNotFound` when GBIF found no match.
    pub fn into_taxon(self, query: &str) -> FinderResult<Taxon> {
        let key = match (self.match_type.as_str(), self.usage_key) {
            ("NONE", _) | (_, None) => return Err(FinderError::SpeciesNotFound(query.to_string())),
            (_, Some(key)) => key,
        };
        let scientific_name = self.scientific_name.unwrap_or_else(|| query.to_string());
        let canonical_name = self
            .canonical_name
            .unwrap_or_else(|| scientific_name.clone());
        Ok(Taxon {
            key,
            scientific_name,
            canonical_name,
        })
    }
}

/// One occurrence record; only the fields used downstream are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub key: Option<u64>,
    pub decimal_latitude: Option<f64>,
    pub decimal_longitude: Option<f64>,
    pub event_date: Option<String>,
    pub dataset_name: Option<String>,
    pub coordinate_uncertainty_in_meters: Option<f64>,
}

impl Occurrence {
    pub fn point(&self) -> Option<SamplePoint> {
        match (self.decimal_longitude, self.decimal_latitude) {
            (Some(lon), Some(lat)) => Some(SamplePoint::new(lon, lat)),
            _ => None,
        }
    }
}

/// Coordinates of the records that have both latitude and longitude.
pub fn coordinates(occurrences: &[Occurrence]) -> Vec<SamplePoint> {
    occurrences.iter().filter_map(Occurrence::point).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OccurrencePage {
    #[serde(default)]
    results: Vec<Occurrence>,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    end_of_records: bool,
}

/// Offset of the next page, or `None` once everything has been collected.
fn next_offset(offset: usize, page_size: usize, page: &OccurrencePage, collected: usize) -> Option<usize> {
    if page.results.is_empty() || page.end_of_records || collected >= page.count {
        None
    } else {
        Some(offset + page_size)
    }
}

/// HTTP client for the public GBIF API.
pub struct GbifClient {
    client: Client,
    config: GbifConfig,
}

impl GbifClient {
    pub fn new(config: GbifConfig) -> FinderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }

    /// GET `path` and decode JSON, retrying transient failures with
    /// exponential backoff.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> FinderResult<T> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let mut delay = Duration::from_millis(self.config.initial_retry_delay_ms);
        let mut attempt = 0;

        loop {
            let result = self
                .client
                .get(&url)
                .query(query)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(response) => return Ok(response.json::<T>().await?),
                Err(e) => {
                    let retryable = e
                        .status()
                        .map_or(true, |s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS);
                    if !retryable || attempt >= self.config.max_retries {
                        return Err(e.into());
                    }
                    attempt += 1;
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "GBIF request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl OccurrenceSource for GbifClient {
    #[instrument(skip(self))]
    async fn match_species(&self, name: &str) -> FinderResult<Taxon> {
        let matched: SpeciesMatch = self
            .get_json("species/match", &[("name", name.to_string())])
            .await?;
        let taxon = matched.into_taxon(name)?;
        info!(key = taxon.key, name = %taxon.scientific_name, "Matched species");
        Ok(taxon)
    }

    #[instrument(skip(self, bbox), fields(bbox = %bbox))]
    async fn occurrences(&self, taxon_key: u64, bbox: &BoundingBox) -> FinderResult<Vec<Occurrence>> {
        let page_size = self.config.page_size;
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let query = [
                ("taxonKey", taxon_key.to_string()),
                ("hasCoordinate", "true".to_string()),
                ("hasGeospatialIssue", "false".to_string()),
                ("decimalLatitude", format!("{},{}", bbox.min_lat, bbox.max_lat)),
                ("decimalLongitude", format!("{},{}", bbox.min_lon, bbox.max_lon)),
                ("limit", page_size.to_string()),
                ("offset", offset.to_string()),
            ];
            let mut page: OccurrencePage = self.get_json("occurrence/search", &query).await?;
            let next = next_offset(offset, page_size, &page, all.len() + page.results.len());
            debug!(offset, records = page.results.len(), total = page.count, "Fetched occurrence page");
            all.append(&mut page.results);

            match next {
                Some(n) => offset = n,
                None => break,
            }
        }

        info!(occurrences = all.len(), "Fetched occurrences");
        Ok(all)
    }
}
