//! Quantized embedding tiles as stored in the local cache.
//!
//! A tile is an int8 array of shape (H, W, C) plus a float scale array.
//! The dequantized value is `raw[h, w, c] * scale[h, w, c]` where the scale
//! is broadcast to (H, W, C):
//!
//! | scale shape | meaning                       |
//! |-------------|-------------------------------|
//! | `()`        | one scale for the whole tile  |
//! | `(C,)`      | per channel                   |
//! | `(H, W)`    | per pixel, shared by channels |
//! | `(H, W, C)` | per element, any axis may be 1|

use std::fs;
use std::path::Path;

use crate::npy::{self, NpyError, NpyResult};

/// An int8 tile with its scale factors.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTile {
    shape: [usize; 3],
    data: Vec<i8>,
    scale_shape: Vec<usize>,
    scale: Vec<f32>,
    /// Element strides into `scale` for (h, w, c); 0 on broadcast axes.
    scale_strides: [usize; 3],
}

/// Resolve how a scale array of `scale_shape` maps onto a tile of `shape`.
fn broadcast_strides(shape: [usize; 3], scale_shape: &[usize]) -> NpyResult<[usize; 3]> {
    let expanded: [usize; 3] = match *scale_shape {
        [] => [1, 1, 1],
        [c] => [1, 1, c],
        [h, w] if h == shape[0] && w == shape[1] => [h, w, 1],
        [w, c] => [1, w, c],
        [h, w, c] => [h, w, c],
        _ => {
            return Err(NpyError::Shape {
                actual: scale_shape.to_vec(),
                reason: "scale must have at most 3 dimensions".to_string(),
            })
        }
    };

    for axis in 0..3 {
        if expanded[axis] != 1 && expanded[axis] != shape[axis] {
            return Err(NpyError::Shape {
                actual: scale_shape.to_vec(),
                reason: format!("not broadcastable to tile shape {:?}", shape),
            });
        }
    }

    let mut strides = [0usize; 3];
    let mut step = 1;
    for axis in (0..3).rev() {
        if expanded[axis] != 1 {
            strides[axis] = step;
        }
        step *= expanded[axis];
    }
    Ok(strides)
}

impl QuantizedTile {
    /// Build a tile, checking that the scale broadcasts onto the data.
    pub fn new(
        shape: [usize; 3],
        data: Vec<i8>,
        scale_shape: Vec<usize>,
        scale: Vec<f32>,
    ) -> NpyResult<Self> {
        let expected = npy::element_count(&shape)?;
        if data.len() != expected {
            return Err(NpyError::DataLength {
                expected,
                actual: data.len(),
            });
        }
        let scale_expected = npy::element_count(&scale_shape)?;
        if scale.len() != scale_expected {
            return Err(NpyError::DataLength {
                expected: scale_expected,
                actual: scale.len(),
            });
        }

        let scale_strides = broadcast_strides(shape, &scale_shape)?;
        Ok(Self {
            shape,
            data,
            scale_shape,
            scale,
            scale_strides,
        })
    }

    /// Decode a tile from the bytes of its data and scale `.npy` files.
    pub fn from_npy(data_bytes: &[u8], scale_bytes: &[u8]) -> NpyResult<Self> {
        let data = npy::decode_i8(data_bytes)?;
        let shape: [usize; 3] = match data.shape.as_slice() {
            &[h, w, c] => [h, w, c],
            _ => {
                return Err(NpyError::Shape {
                    actual: data.shape.clone(),
                    reason: "tile data must be (H, W, C)".to_string(),
                })
            }
        };
        let scale = npy::decode_f32(scale_bytes)?;
        Self::new(shape, data.data, scale.shape, scale.data)
    }

    /// Quantize a float tile with one scale per pixel (`max |v| / 127`).
    pub fn quantize(shape: [usize; 3], values: &[f32]) -> NpyResult<Self> {
        let [h, w, c] = shape;
        let expected = npy::element_count(&shape)?;
        if values.len() != expected {
            return Err(NpyError::DataLength {
                expected,
                actual: values.len(),
            });
        }

        let mut data = Vec::with_capacity(expected);
        let mut scale = Vec::with_capacity(h * w);
        for p in 0..h * w {
            let pixel = &values[p * c..(p + 1) * c];
            let max = pixel.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            let s = max / 127.0;
            scale.push(s);
            for &v in pixel {
                let q = if s > 0.0 { (v / s).round() } else { 0.0 };
                data.push(q.clamp(-127.0, 127.0) as i8);
            }
        }

        Self::new(shape, data, vec![h, w], scale)
    }

    /// Tile shape as (H, W, C).
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn raw(&self) -> &[i8] {
        &self.data
    }

    pub fn scale_shape(&self) -> &[usize] {
        &self.scale_shape
    }

    /// Dequantize into a row-major (H, W, C) float array.
    pub fn dequantize(&self) -> Vec<f32> {
        let [h, w, c] = self.shape;
        let [sh, sw, sc] = self.scale_strides;
        let mut out = Vec::with_capacity(self.data.len());
        for row in 0..h {
            for col in 0..w {
                let base = (row * w + col) * c;
                for ch in 0..c {
                    let scale = self.scale[row * sh + col * sw + ch * sc];
                    out.push(self.data[base + ch] as f32 * scale);
                }
            }
        }
        out
    }

    /// Write the tile as a pair of `.npy` files.
    pub fn write_to(&self, data_path: &Path, scale_path: &Path) -> std::io::Result<()> {
        let to_io = |e: NpyError| std::io::Error::new(std::io::ErrorKind::InvalidData, e);

        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(parent) = scale_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(data_path, npy::encode_i8(&self.shape, &self.data).map_err(to_io)?)?;
        fs::write(
            scale_path,
            npy::encode_f32(&self.scale_shape, &self.scale).map_err(to_io)?,
        )?;
        Ok(())
    }
}
