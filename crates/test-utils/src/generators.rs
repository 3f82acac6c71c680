//! Synthetic embedding data.
//!
//! Tile generators return row-major (H, W, C) values ready for
//! [`crate::TileCacheFixture::write_tile`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tile values where `value(row, col, ch) = f(row, col, ch)`.
fn tile_from_fn(shape: [usize; 3], f: impl Fn(usize, usize, usize) -> f32) -> Vec<f32> {
    let [h, w, c] = shape;
    let mut data = Vec::with_capacity(h * w * c);
    for row in 0..h {
        for col in 0..w {
            for ch in 0..c {
                data.push(f(row, col, ch));
            }
        }
    }
    data
}

/// A tile split at column `split_col`: pixels west of it carry the
/// "habitat" signature `+1` on channel 0, pixels east of it `-1`.
/// Other channels hold a small deterministic texture.
///
/// ```
/// use test_utils::split_habitat_tile;
///
/// let tile = split_habitat_tile([2, 4, 3], 2);
/// assert_eq!(tile[0], 1.0);   // (0, 0, ch 0)
/// assert_eq!(tile[9], -1.0);  // (0, 3, ch 0)
/// ```
pub fn split_habitat_tile(shape: [usize; 3], split_col: usize) -> Vec<f32> {
    tile_from_fn(shape, |row, col, ch| match ch {
        0 if col < split_col => 1.0,
        0 => -1.0,
        _ => ((row * 7 + col * 3 + ch) % 11) as f32 / 22.0 - 0.25,
    })
}

/// `n` random (lon, lat) points inside a bbox given as (min_lon, min_lat, max_lon, max_lat).
pub fn random_points_in(bbox: (f64, f64, f64, f64), n: usize, seed: u64) -> Vec<(f64, f64)> {
    let (min_lon, min_lat, max_lon, max_lat) = bbox;
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            (
                rng.gen_range(min_lon..max_lon),
                rng.gen_range(min_lat..max_lat),
            )
        })
        .collect()
}
