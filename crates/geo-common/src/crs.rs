//! Coordinate reference system handling.
//!
//! Embedding mosaics are always geographic WGS84; other CRSs are rejected at
//! the boundary rather than reprojected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GeoError;

/// Supported coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Crs {
    /// WGS84 geographic, lon/lat in degrees.
    #[default]
    Wgs84,
}

impl Crs {
    /// EPSG code, as written into GeoTIFF geokeys.
    pub fn epsg(&self) -> u16 {
        match self {
            Crs::Wgs84 => 4326,
        }
    }

    /// OGC URN used in GeoJSON `crs` members.
    pub fn ogc_urn(&self) -> &'static str {
        match self {
            Crs::Wgs84 => "urn:ogc:def:crs:OGC:1.3:CRS84",
        }
    }

    /// Look up a CRS by EPSG code.
    pub fn from_epsg(code: u32) -> Result<Self, GeoError> {
        match code {
            4326 => Ok(Crs::Wgs84),
            other => Err(GeoError::UnsupportedCrs(format!("EPSG:{}", other))),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Accepts `EPSG:4326` (any case) and `CRS:84`.
impl FromStr for Crs {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" | "WGS84" => Ok(Crs::Wgs84),
            _ => Err(GeoError::UnsupportedCrs(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("CRS:84".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert!("EPSG:3857".parse::<Crs>().is_err());
    }

    #[test]
    fn test_from_epsg() {
        assert_eq!(Crs::from_epsg(4326).unwrap(), Crs::Wgs84);
        assert!(matches!(Crs::from_epsg(32630), Err(GeoError::UnsupportedCrs(_))));
        assert_eq!(Crs::Wgs84.to_string(), "EPSG:4326");
    }
}
