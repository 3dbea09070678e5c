//! Reading and writing numpy `.npy` arrays.

use std::sync::LazyLock;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use regex::Regex;
use thiserror::Error;

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGN: usize = 64;

static DESCR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'descr'\s*:\s*'([^']*)'").unwrap());
static FORTRAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'fortran_order'\s*:\s*(True|False)").unwrap());
static SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").unwrap());

#[derive(Debug, Error, PartialEq)]
pub enum NpyError {
    #[error("missing NUMPY magic string")]
    BadMagic,

    #[error("unsupported npy format version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("malformed npy header: {0}")]
    Header(String),

    #[error("unsupported dtype {0}")]
    UnsupportedDtype(String),

    #[error("array data truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Signed,
    Unsigned,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    big_endian: bool,
    kind: Kind,
    size: usize,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        let unsupported = || NpyError::UnsupportedDtype(descr.to_string());
        let mut chars = descr.chars();
        let big_endian = match chars.next().ok_or_else(unsupported)? {
            '<' | '|' | '=' => false,
            '>' => true,
            _ => return Err(unsupported()),
        };
        let kind = match chars.next().ok_or_else(unsupported)? {
            'f' => Kind::Float,
            'i' => Kind::Signed,
            'u' => Kind::Unsigned,
            'b' => Kind::Bool,
            _ => return Err(unsupported()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;
        let valid = match kind {
            Kind::Float => matches!(size, 4 | 8),
            Kind::Signed | Kind::Unsigned => matches!(size, 1 | 2 | 4 | 8),
            Kind::Bool => size == 1,
        };
        if !valid {
            return Err(unsupported());
        }
        Ok(Self {
            big_endian,
            kind,
            size,
        })
    }

    fn read(&self, chunk: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..self.size].copy_from_slice(chunk);
        if self.big_endian {
            buf[..self.size].reverse();
        }
        match (self.kind, self.size) {
            (Kind::Float, 4) => f64::from(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            (Kind::Float, _) => f64::from_le_bytes(buf),
            (Kind::Signed, 1) => f64::from(buf[0] as i8),
            (Kind::Signed, 2) => f64::from(i16::from_le_bytes([buf[0], buf[1]])),
            (Kind::Signed, 4) => f64::from(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            (Kind::Signed, _) => i64::from_le_bytes(buf) as f64,
            (Kind::Unsigned, _) | (Kind::Bool, _) => u64::from_le_bytes(buf) as f64,
        }
    }
}

/// Serializes `array` as a version 1.0 `.npy` payload of little-endian `f64` in C order.
pub fn encode_npy(array: &ArrayD<f64>) -> Vec<u8> {
    let dims: Vec<String> = array.shape().iter().map(|d| d.to_string()).collect();
    let shape = match dims.len() {
        1 => format!("({},)", dims[0]),
        _ => format!("({})", dims.join(", ")),
    };
    let mut header = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape}, }}");

    // magic + version + u16 length + header + newline, padded to ALIGN
    let preamble = MAGIC.len() + 2 + 2;
    let unpadded = preamble + header.len() + 1;
    let pad = (ALIGN - unpadded % ALIGN) % ALIGN;
    header.push_str(&" ".repeat(pad));
    header.push('\n');

    let mut bytes = Vec::with_capacity(preamble + header.len() + array.len() * 8);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in array.iter() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Parses a `.npy` payload of any plain numeric dtype into `f64` values in standard layout.
pub fn decode_npy(bytes: &[u8]) -> Result<ArrayD<f64>, NpyError> {
    if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(NpyError::BadMagic);
    }
    let (major, minor) = (bytes[6], bytes[7]);
    let (header_len, header_start) = match major {
        1 => (
            usize::from(u16::from_le_bytes(read_array(bytes, 8)?)),
            10,
        ),
        2 | 3 => (u32::from_le_bytes(read_array(bytes, 8)?) as usize, 12),
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| NpyError::Header("header extends past end of file".to_string()))?;
    let header = std::str::from_utf8(header)
        .map_err(|_| NpyError::Header("header is not valid text".to_string()))?;

    let descr = capture(&DESCR_RE, header, "descr")?;
    let dtype = Dtype::parse(descr)?;
    let fortran_order = capture(&FORTRAN_RE, header, "fortran_order")? == "True";
    let shape = parse_shape(capture(&SHAPE_RE, header, "shape")?)?;

    let expected = shape
        .iter()
        .try_fold(dtype.size, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| NpyError::Header(format!("shape {shape:?} is too large")))?;
    let data = &bytes[data_start..];
    if data.len() < expected {
        return Err(NpyError::Truncated {
            expected,
            found: data.len(),
        });
    }
    let values: Vec<f64> = data[..expected]
        .chunks_exact(dtype.size)
        .map(|chunk| dtype.read(chunk))
        .collect();

    let array = if fortran_order {
        ArrayD::from_shape_vec(IxDyn(&shape).f(), values)
    } else {
        ArrayD::from_shape_vec(IxDyn(&shape), values)
    }
    .map_err(|err| NpyError::Header(err.to_string()))?;
    Ok(array.as_standard_layout().into_owned())
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N], NpyError> {
    bytes
        .get(at..at + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| NpyError::Header("file too short for header length".to_string()))
}

fn capture<'a>(re: &Regex, header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    re.captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| NpyError::Header(format!("missing {key}")))
}

fn parse_shape(raw: &str) -> Result<Vec<usize>, NpyError> {
    raw.split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.parse::<usize>()
                .map_err(|_| NpyError::Header(format!("invalid dimension {dim}")))
        })
        .collect()
}
