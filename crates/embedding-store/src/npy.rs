//! Minimal NumPy `.npy` codec.
//!
//! Supports format versions 1.0, 2.0 and 3.0, C-order arrays only, and the
//! three dtypes the tile cache uses: `i1` for quantized values and `f4`/`f8`
//! for scales (either byte order). The header dictionary is parsed with
//! `nom`; the payload is decoded with `from_le_bytes`/`from_be_bytes`.
//!
//! ```text
//! \x93NUMPY | major | minor | header_len (u16 LE v1, u32 LE v2/v3) | header | data
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::separated_list0,
    sequence::{delimited, separated_pair, terminated},
    IResult,
};
use thiserror::Error;

const MAGIC: &[u8] = b"\x93NUMPY";

/// Headers written by [`encode_i8`]/[`encode_f32`] are padded to this.
const HEADER_ALIGN: usize = 64;

/// Errors raised while decoding or encoding `.npy` data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NpyError {
    #[error("not an .npy file (bad magic)")]
    BadMagic,

    #[error("unsupported .npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("truncated .npy file")]
    Truncated,

    #[error("malformed .npy header: {0}")]
    MalformedHeader(String),

    #[error("unsupported dtype '{0}'")]
    UnsupportedDtype(String),

    #[error("fortran-ordered arrays are not supported")]
    FortranOrder,

    #[error("payload has {actual} bytes, shape requires {expected}")]
    DataLength { expected: usize, actual: usize },

    #[error("unexpected shape {actual:?}: {reason}")]
    Shape { actual: Vec<usize>, reason: String },
}

pub type NpyResult<T> = std::result::Result<T, NpyError>;

/// Element type of an array, with byte order for multi-byte types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Int8,
    Float32 { little_endian: bool },
    Float64 { little_endian: bool },
}

impl Dtype {
    fn parse(descr: &str) -> NpyResult<Self> {
        let unsupported = || NpyError::UnsupportedDtype(descr.to_string());
        let mut chars = descr.chars();
        let order = chars.next().ok_or_else(unsupported)?;
        let little_endian = match order {
            '<' | '|' => true,
            '>' => false,
            '=' => cfg!(target_endian = "little"),
            _ => return Err(unsupported()),
        };
        match chars.as_str() {
            "i1" => Ok(Dtype::Int8),
            "f4" => Ok(Dtype::Float32 { little_endian }),
            "f8" => Ok(Dtype::Float64 { little_endian }),
            _ => Err(unsupported()),
        }
    }

    fn item_size(&self) -> usize {
        match self {
            Dtype::Int8 => 1,
            Dtype::Float32 { .. } => 4,
            Dtype::Float64 { .. } => 8,
        }
    }
}

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyHeader {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Number of elements described by the shape (1 for a scalar).
    pub fn element_count(&self) -> NpyResult<usize> {
        element_count(&self.shape)
    }
}

/// Product of `shape`, or [`NpyError::Shape`] when it overflows `usize`.
pub fn element_count(shape: &[usize]) -> NpyResult<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| NpyError::Shape {
            actual: shape.to_vec(),
            reason: "element count overflows".to_string(),
        })
}

/// A decoded array.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

// ============================================================================
// Header dictionary grammar
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum HeaderValue {
    Str(String),
    Bool(bool),
    Tuple(Vec<usize>),
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
    ))(input)
}

fn dimension(input: &str) -> IResult<&str, usize> {
    // Python 2 era files may write long literals such as `10L`.
    terminated(
        map_res(digit1, |s: &str| s.parse::<usize>()),
        opt(char('L')),
    )(input)
}

fn tuple(input: &str) -> IResult<&str, Vec<usize>> {
    delimited(
        char('('),
        terminated(
            separated_list0(ws(char(',')), ws(dimension)),
            opt(ws(char(','))),
        ),
        ws(char(')')),
    )(input)
}

fn header_value(input: &str) -> IResult<&str, HeaderValue> {
    alt((
        map(quoted, |s| HeaderValue::Str(s.to_string())),
        value(HeaderValue::Bool(true), tag("True")),
        value(HeaderValue::Bool(false), tag("False")),
        map(tuple, HeaderValue::Tuple),
    ))(input)
}

fn entry(input: &str) -> IResult<&str, (&str, HeaderValue)> {
    separated_pair(ws(quoted), char(':'), ws(header_value))(input)
}

fn dictionary(input: &str) -> IResult<&str, Vec<(&str, HeaderValue)>> {
    delimited(
        ws(char('{')),
        terminated(separated_list0(ws(char(',')), entry), opt(ws(char(',')))),
        ws(char('}')),
    )(input)
}

fn parse_dictionary(text: &str) -> NpyResult<NpyHeader> {
    let (_, entries) = all_consuming(dictionary)(text)
        .map_err(|e| NpyError::MalformedHeader(e.to_string()))?;

    let mut descr = None;
    let mut fortran_order = None;
    let mut shape = None;

    for (key, val) in entries {
        match (key, val) {
            ("descr", HeaderValue::Str(s)) => descr = Some(s),
            ("fortran_order", HeaderValue::Bool(b)) => fortran_order = Some(b),
            ("shape", HeaderValue::Tuple(t)) => shape = Some(t),
            (other, v) => {
                return Err(NpyError::MalformedHeader(format!(
                    "unexpected entry '{}': {:?}",
                    other, v
                )))
            }
        }
    }

    let missing = |k: &str| NpyError::MalformedHeader(format!("missing '{}'", k));
    let descr = descr.ok_or_else(|| missing("descr"))?;
    if fortran_order.ok_or_else(|| missing("fortran_order"))? {
        return Err(NpyError::FortranOrder);
    }
    let shape = shape.ok_or_else(|| missing("shape"))?;

    Ok(NpyHeader {
        dtype: Dtype::parse(&descr)?,
        shape,
    })
}

// ============================================================================
// Decoding
// ============================================================================

/// Parse the preamble and header; returns the header and the payload slice.
pub fn parse_header(bytes: &[u8]) -> NpyResult<(NpyHeader, &[u8])> {
    if bytes.len() < MAGIC.len() + 2 {
        return Err(if bytes.starts_with(MAGIC) || MAGIC.starts_with(bytes) {
            NpyError::Truncated
        } else {
            NpyError::BadMagic
        });
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(NpyError::BadMagic);
    }

    let major = bytes[6];
    let minor = bytes[7];
    let (len_size, header_len) = match major {
        1 => {
            let raw = bytes.get(8..10).ok_or(NpyError::Truncated)?;
            (2, u16::from_le_bytes([raw[0], raw[1]]) as usize)
        }
        2 | 3 => {
            let raw = bytes.get(8..12).ok_or(NpyError::Truncated)?;
            (4, u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
        }
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    let start = 8 + len_size;
    let header_bytes = bytes
        .get(start..start + header_len)
        .ok_or(NpyError::Truncated)?;

    // v1/v2 headers are latin-1; every character the grammar accepts is ASCII.
    let text = std::str::from_utf8(header_bytes)
        .map_err(|e| NpyError::MalformedHeader(e.to_string()))?;

    let header = parse_dictionary(text)?;
    Ok((header, &bytes[start + header_len..]))
}

fn checked_payload<'a>(header: &NpyHeader, payload: &'a [u8]) -> NpyResult<&'a [u8]> {
    let expected = header
        .element_count()?
        .checked_mul(header.dtype.item_size())
        .ok_or_else(|| NpyError::Shape {
            actual: header.shape.clone(),
            reason: "payload size overflows".to_string(),
        })?;
    if payload.len() != expected {
        return Err(NpyError::DataLength {
            expected,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

/// Decode an `i1` array.
pub fn decode_i8(bytes: &[u8]) -> NpyResult<NpyArray<i8>> {
    let (header, payload) = parse_header(bytes)?;
    if header.dtype != Dtype::Int8 {
        return Err(NpyError::UnsupportedDtype(format!(
            "{:?} (expected i1)",
            header.dtype
        )));
    }
    let payload = checked_payload(&header, payload)?;
    Ok(NpyArray {
        shape: header.shape,
        data: payload.iter().map(|&b| b as i8).collect(),
    })
}

/// Decode an `f4` or `f8` array into `f32` values.
pub fn decode_f32(bytes: &[u8]) -> NpyResult<NpyArray<f32>> {
    let (header, payload) = parse_header(bytes)?;
    let payload = checked_payload(&header, payload)?;

    let data = match header.dtype {
        Dtype::Float32 { little_endian } => payload
            .chunks_exact(4)
            .map(|c| {
                let raw = [c[0], c[1], c[2], c[3]];
                if little_endian {
                    f32::from_le_bytes(raw)
                } else {
                    f32::from_be_bytes(raw)
                }
            })
            .collect(),
        Dtype::Float64 { little_endian } => payload
            .chunks_exact(8)
            .map(|c| {
                let raw = [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]];
                let v = if little_endian {
                    f64::from_le_bytes(raw)
                } else {
                    f64::from_be_bytes(raw)
                };
                v as f32
            })
            .collect(),
        Dtype::Int8 => {
            return Err(NpyError::UnsupportedDtype(
                "Int8 (expected f4 or f8)".to_string(),
            ))
        }
    };

    Ok(NpyArray {
        shape: header.shape,
        data,
    })
}

// ============================================================================
// Encoding
// ============================================================================

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [single] => format!("({},)", single),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn encode_header(descr: &str, shape: &[usize]) -> Vec<u8> {
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr,
        shape_literal(shape)
    );
    // magic(6) + version(2) + length(2) + dict + '\n'
    let unpadded = MAGIC.len() + 4 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + dict.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out
}

fn check_len(shape: &[usize], len: usize) -> NpyResult<()> {
    let expected = element_count(shape)?;
    if expected != len {
        return Err(NpyError::DataLength {
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Encode an `i1` array as a version 1.0 `.npy` file.
pub fn encode_i8(shape: &[usize], data: &[i8]) -> NpyResult<Vec<u8>> {
    check_len(shape, data.len())?;
    let mut out = encode_header("|i1", shape);
    out.extend(data.iter().map(|&v| v as u8));
    Ok(out)
}

/// Encode a little-endian `f4` array as a version 1.0 `.npy` file.
pub fn encode_f32(shape: &[usize], data: &[f32]) -> NpyResult<Vec<u8>> {
    check_len(shape, data.len())?;
    let mut out = encode_header("<f4", shape);
    out.reserve(data.len() * 4);
    for v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}
