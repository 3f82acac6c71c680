//! Tests for bounding boxes, the tile grid and transforms working together.

use geo_common::{BoundingBox, GeoError, GeoTransform, GridCellKey, TileGrid};
use test_utils::assert_coords_approx_eq;

// ============================================================================
// BoundingBox parsing
// ============================================================================

#[test]
fn test_parse_bbox_with_whitespace() {
    let bbox: BoundingBox = " -0.003, 52.092 ,0.250,52.318".parse().unwrap();
    assert_eq!(bbox.min_lon, -0.003);
    assert_eq!(bbox.max_lat, 52.318);
}

#[test]
fn test_parse_bbox_too_few_parts() {
    let result = "0,0,1".parse::<BoundingBox>();
    assert!(matches!(result, Err(GeoError::InvalidBbox(_))));
}

#[test]
fn test_parse_bbox_bad_number() {
    let result = "0,abc,1,1".parse::<BoundingBox>();
    assert_eq!(result, Err(GeoError::InvalidNumber("abc".to_string())));
}

#[test]
fn test_parse_bbox_inverted() {
    let result = "1,0,0,1".parse::<BoundingBox>();
    assert!(matches!(result, Err(GeoError::InvalidBbox(_))));
}

#[test]
fn test_bbox_union_and_contains() {
    let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
    let b = BoundingBox::new(0.5, -1.0, 2.0, 0.5);
    let u = a.union(&b);
    assert_eq!(u, BoundingBox::new(0.0, -1.0, 2.0, 1.0));

    assert!(a.contains(1.0, 1.0));
    assert!(!a.contains_half_open(1.0, 1.0));
    assert!(a.contains_half_open(0.0, 0.0));
}

// ============================================================================
// Tile grid
// ============================================================================

#[test]
fn test_every_point_in_bbox_has_its_tile_enumerated() {
    let grid = TileGrid::default();
    let bbox = BoundingBox::new(-0.31, 51.87, 0.42, 52.33);
    let keys = grid.keys_for_bbox(&bbox);

    let mut lat = bbox.min_lat;
    while lat < bbox.max_lat {
        let mut lon = bbox.min_lon;
        while lon < bbox.max_lon {
            let key = grid.key_at(lon, lat);
            assert!(keys.contains(&key), "missing tile {} for ({}, {})", key, lon, lat);
            lon += 0.013;
        }
        lat += 0.017;
    }
}

#[test]
fn test_enumerated_tiles_all_intersect_bbox() {
    let grid = TileGrid::default();
    let bbox = BoundingBox::new(-0.31, 51.87, 0.42, 52.33);
    for key in grid.keys_for_bbox(&bbox) {
        assert!(grid.tile_bounds(&key).intersects(&bbox), "{} does not intersect", key);
    }
}

#[test]
fn test_negative_hemisphere_keys() {
    let grid = TileGrid::default();
    let bbox = BoundingBox::new(-70.62, -33.48, -70.58, -33.41);
    let keys = grid.keys_for_bbox(&bbox);
    assert!(keys.contains(&GridCellKey::new(-70.65, -33.45)));
    assert!(keys
        .iter()
        .all(|k| k.tile_name().starts_with("grid_-70.")));
}

// ============================================================================
// Transforms
// ============================================================================

#[test]
fn test_sample_round_trip_lands_in_same_pixel() {
    let transform = GeoTransform::from_bounds(0.05, 52.05, 0.25, 52.25, 20, 20);

    for i in 0..200 {
        let lon = 0.05 + 0.2 * (i as f64 + 0.37) / 200.0;
        let lat = 52.05 + 0.2 * (i as f64 * 7.0 % 200.0 + 0.61) / 200.0;

        let (row, col) = transform.lonlat_to_pixel(lon, lat);
        let (corner_lon, corner_lat) = transform.pixel_to_lonlat(row, col);
        assert_eq!(transform.lonlat_to_pixel(corner_lon, corner_lat), (row, col));

        // The corner is north-west of the sample and within one pixel.
        assert!(corner_lon <= lon && lon - corner_lon < transform.pixel_width + 1e-12);
        assert!(corner_lat >= lat && corner_lat - lat < -transform.pixel_height + 1e-12);
    }
}

#[test]
fn test_pixel_center_is_inside_pixel() {
    let transform = GeoTransform::from_bounds(0.0, 0.0, 1.0, 1.0, 10, 10);
    let (lon, lat) = transform.pixel_center(3, 7);
    assert_coords_approx_eq!((lon, lat), (0.75, 0.65), 1e-12);
    assert_eq!(transform.lonlat_to_pixel(lon, lat), (3, 7));
}
