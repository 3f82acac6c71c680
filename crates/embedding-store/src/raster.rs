//! GeoTIFF reading and writing.
//!
//! Mosaic artifacts store one `Gray32Float` page per band; every page carries
//! the GeoTIFF georeferencing tags:
//!
//! | tag                | value                                   |
//! |--------------------|-----------------------------------------|
//! | `ModelPixelScale`  | `(pixel_width, |pixel_height|, 0)`      |
//! | `ModelTiepoint`    | raster `(0, 0, 0)` → `(lon, lat, 0)`    |
//! | `GeoKeyDirectory`  | geographic model, pixel-is-area, 4326   |
//! | `ImageDescription` | `embedding_year=<year>` (mosaics only)  |

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype::Gray32Float, DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::{debug, info};

use geo_common::{Crs, GeoTransform};

use crate::error::{EmbeddingError, Result};
use crate::mosaic::EmbeddingMosaic;

/// Prefix of the `ImageDescription` value recording a mosaic's year.
const YEAR_DESCRIPTION_PREFIX: &str = "embedding_year=";

/// `GDAL_NODATA`, an ASCII tag understood by GDAL-based readers.
const GDAL_NODATA_TAG: u16 = 42113;

// GeoKey ids and values.
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

fn geo_key_directory(crs: Crs) -> [u16; 16] {
    [
        1, 1, 0, 3, // version, revision, minor, key count
        GT_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        GEOGRAPHIC_TYPE, 0, 1, crs.epsg(),
    ]
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    transform: &GeoTransform,
    crs: Crs,
    nodata: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    let (sx, sy) = transform.pixel_size();
    dir.write_tag(Tag::ModelPixelScaleTag, &[sx, sy, 0.0][..])?;
    dir.write_tag(
        Tag::ModelTiepointTag,
        &[0.0, 0.0, 0.0, transform.origin_lon, transform.origin_lat, 0.0][..],
    )?;
    dir.write_tag(Tag::GeoKeyDirectoryTag, &geo_key_directory(crs)[..])?;
    if let Some(nodata) = nodata {
        dir.write_tag(Tag::Unknown(GDAL_NODATA_TAG), nodata)?;
    }
    if let Some(description) = description {
        dir.write_tag(Tag::ImageDescription, description)?;
    }
    Ok(())
}

/// Write `bands` (each `width * height` row-major values) as float32 pages.
fn write_pages<'a>(
    path: &Path,
    width: usize,
    height: usize,
    bands: impl Iterator<Item = &'a [f32]>,
    transform: &GeoTransform,
    nodata: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;

    for band in bands {
        let mut image = encoder.new_image::<Gray32Float>(width as u32, height as u32)?;
        write_geo_tags(image.encoder(), transform, Crs::Wgs84, nodata, description)?;
        image.write_data(band)?;
    }
    Ok(())
}

/// Write a mosaic of `year` as a multi-page GeoTIFF, one page per channel.
pub fn write_mosaic(path: &Path, mosaic: &EmbeddingMosaic, year: i32) -> Result<()> {
    let [height, width, channels] = mosaic.shape();
    let data = mosaic.data();

    let planes: Vec<Vec<f32>> = (0..channels)
        .map(|c| data.iter().skip(c).step_by(channels).copied().collect())
        .collect();

    write_pages(
        path,
        width,
        height,
        planes.iter().map(|p| p.as_slice()),
        mosaic.transform(),
        None,
        Some(&format!("{}{}", YEAR_DESCRIPTION_PREFIX, year)),
    )?;

    info!(
        path = %path.display(),
        year,
        height,
        width,
        channels,
        "Wrote mosaic artifact"
    );
    Ok(())
}

/// Write a single float32 band with `GDAL_NODATA = nan`.
pub fn write_float_raster(
    path: &Path,
    values: &[f32],
    width: usize,
    height: usize,
    transform: &GeoTransform,
) -> Result<()> {
    if values.len() != width * height {
        return Err(EmbeddingError::artifact(format!(
            "raster has {} values, {}x{} requires {}",
            values.len(),
            width,
            height,
            width * height
        )));
    }
    write_pages(
        path,
        width,
        height,
        std::iter::once(values),
        transform,
        Some("nan"),
        None,
    )?;
    debug!(path = %path.display(), width, height, "Wrote float raster");
    Ok(())
}

fn transform_from_tags(scale: &[f64], tiepoint: &[f64]) -> Result<GeoTransform> {
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(EmbeddingError::artifact("incomplete georeferencing tags"));
    }
    let (sx, sy) = (scale[0], scale[1]);
    if !(sx > 0.0) || !(sy > 0.0) {
        return Err(EmbeddingError::artifact(format!(
            "invalid pixel scale ({}, {})",
            sx, sy
        )));
    }
    let origin_lon = tiepoint[3] - tiepoint[0] * sx;
    let origin_lat = tiepoint[4] + tiepoint[1] * sy;
    Ok(GeoTransform::new(origin_lon, origin_lat, sx, -sy))
}

/// A single-band raster read back from disk.
#[derive(Debug, Clone)]
pub struct FloatRaster {
    pub width: usize,
    pub height: usize,
    pub bands: Vec<Vec<f32>>,
    pub transform: GeoTransform,
    /// `ImageDescription` of the first page, if present.
    pub description: Option<String>,
}

/// A mosaic artifact and the embedding year it was written for.
#[derive(Debug, Clone)]
pub struct MosaicArtifact {
    pub mosaic: EmbeddingMosaic,
    /// `None` for files without a year description.
    pub year: Option<i32>,
}

/// Read every float32 page of a GeoTIFF written by this module.
pub fn read_float_pages(path: &Path) -> Result<FloatRaster> {
    let reader = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
    let transform = transform_from_tags(&scale, &tiepoint)?;
    let description = match decoder.find_tag(Tag::ImageDescription)? {
        Some(value) => Some(value.into_string()?),
        None => None,
    };

    let mut bands = Vec::new();
    loop {
        if decoder.dimensions()? != (width, height) {
            return Err(EmbeddingError::artifact("pages differ in size"));
        }
        match decoder.read_image()? {
            DecodingResult::F32(values) => bands.push(values),
            _ => return Err(EmbeddingError::artifact("expected float32 pages")),
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    Ok(FloatRaster {
        width: width as usize,
        height: height as usize,
        bands,
        transform,
        description,
    })
}

/// Read a mosaic artifact written by [`write_mosaic`].
pub fn read_mosaic(path: &Path) -> Result<MosaicArtifact> {
    let raster = read_float_pages(path)?;
    let year = raster
        .description
        .as_deref()
        .and_then(|d| d.trim().strip_prefix(YEAR_DESCRIPTION_PREFIX))
        .and_then(|y| y.parse().ok());
    let channels = raster.bands.len();
    let pixels = raster.width * raster.height;

    let mut data = vec![0.0f32; pixels * channels];
    for (c, band) in raster.bands.iter().enumerate() {
        for (p, v) in band.iter().enumerate() {
            data[p * channels + c] = *v;
        }
    }

    info!(
        path = %path.display(),
        height = raster.height,
        width = raster.width,
        channels,
        year = ?year,
        "Read mosaic artifact"
    );

    let mosaic = EmbeddingMosaic::new(
        [raster.height, raster.width, channels],
        data,
        raster.transform,
    )?;
    Ok(MosaicArtifact { mosaic, year })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mosaic_artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mosaic.tif");

        let data: Vec<f32> = (0..3 * 5 * 4).map(|i| i as f32 * 0.25 - 7.0).collect();
        let transform = GeoTransform::from_bounds(0.05, 52.05, 0.55, 52.35, 5, 3);
        let mosaic = EmbeddingMosaic::new([3, 5, 4], data, transform).unwrap();

        write_mosaic(&path, &mosaic, 2023).unwrap();
        let artifact = read_mosaic(&path).unwrap();
        assert_eq!(artifact.year, Some(2023));

        let read = artifact.mosaic;
        assert_eq!(read.shape(), mosaic.shape());
        assert_eq!(read.data(), mosaic.data());
        assert!(read.transform().approx_eq(mosaic.transform(), 1e-9));
    }

    #[test]
    fn test_float_raster_keeps_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probability.tif");
        let transform = GeoTransform::from_bounds(0.0, 0.0, 2.0, 1.0, 2, 1);

        write_float_raster(&path, &[0.25, f32::NAN], 2, 1, &transform).unwrap();
        let raster = read_float_pages(&path).unwrap();

        assert_eq!(raster.bands.len(), 1);
        assert_eq!(raster.description, None);
        assert_eq!(raster.bands[0][0], 0.25);
        assert!(raster.bands[0][1].is_nan());
    }

    #[test]
    fn test_float_raster_rejects_bad_length() {
        let dir = tempfile::tempdir().unwrap();
        let transform = GeoTransform::from_bounds(0.0, 0.0, 1.0, 1.0, 2, 2);
        let result = write_float_raster(&dir.path().join("x.tif"), &[0.0; 3], 2, 2, &transform);
        assert!(matches!(result, Err(EmbeddingError::Artifact(_))));
    }

    #[test]
    fn test_missing_artifact_is_io_error() {
        let result = read_mosaic(Path::new("/nonexistent/mosaic.tif"));
        assert!(matches!(result, Err(EmbeddingError::Io(_))));
    }
}
