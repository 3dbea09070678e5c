//! FITS image decoding.
//!
//! A FITS file is a sequence of HDUs. Each HDU is a header of 80-byte ASCII cards, padded to
//! a 2880-byte block, followed by big-endian data padded the same way. The decoder returns
//! the first HDU that carries image data: the primary HDU when `NAXIS > 0`, otherwise the
//! first `XTENSION = 'IMAGE'` extension.

use ndarray::{ArrayD, IxDyn};
use thiserror::Error;

pub const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;

#[derive(Debug, Error, PartialEq)]
pub enum FitsError {
    #[error("not a FITS file (missing SIMPLE card)")]
    NotFits,

    #[error("header is truncated or has no END card")]
    TruncatedHeader,

    #[error("header card {0} is not ASCII")]
    InvalidCard(usize),

    #[error("missing keyword {0}")]
    MissingKeyword(String),

    #[error("invalid value for {keyword}: {value}")]
    InvalidValue { keyword: String, value: String },

    #[error("unsupported BITPIX {0}")]
    UnsupportedBitpix(i64),

    #[error("data unit truncated: expected {expected} bytes, found {found}")]
    TruncatedData { expected: usize, found: usize },

    #[error("no image data in any HDU")]
    NoImage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Logical(bool),
}

#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    cards: Vec<(String, HeaderValue)>,
}

impl FitsHeader {
    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|(key, _)| key == keyword)
            .map(|(_, value)| value)
    }

    pub fn get_int(&self, keyword: &str) -> Option<i64> {
        match self.get(keyword)? {
            HeaderValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_float(&self, keyword: &str) -> Option<f64> {
        match self.get(keyword)? {
            HeaderValue::Float(value) => Some(*value),
            HeaderValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn get_text(&self, keyword: &str) -> Option<&str> {
        match self.get(keyword)? {
            HeaderValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_bool(&self, keyword: &str) -> Option<bool> {
        match self.get(keyword)? {
            HeaderValue::Logical(value) => Some(*value),
            _ => None,
        }
    }

    fn require_int(&self, keyword: &str) -> Result<i64, FitsError> {
        self.get_int(keyword)
            .ok_or_else(|| FitsError::MissingKeyword(keyword.to_string()))
    }
}

/// Geometry of one HDU's data unit.
#[derive(Debug, Clone)]
struct DataUnit {
    bitpix: i64,
    /// NAXIS1 first, as stored in the header.
    axes: Vec<usize>,
    /// Number of values in the data array.
    count: usize,
    /// Bytes occupied by the data unit before block padding.
    byte_len: usize,
}

impl DataUnit {
    fn from_header(header: &FitsHeader) -> Result<Self, FitsError> {
        let bitpix = header.require_int("BITPIX")?;
        let bytes_per_value = match bitpix {
            8 => 1,
            16 => 2,
            32 | -32 => 4,
            64 | -64 => 8,
            other => return Err(FitsError::UnsupportedBitpix(other)),
        };
        let naxis = header.require_int("NAXIS")?;
        if !(0..=999).contains(&naxis) {
            return Err(FitsError::InvalidValue {
                keyword: "NAXIS".to_string(),
                value: naxis.to_string(),
            });
        }
        let mut axes = Vec::with_capacity(naxis as usize);
        for n in 1..=naxis {
            let keyword = format!("NAXIS{n}");
            let length = header.require_int(&keyword)?;
            let length = usize::try_from(length).map_err(|_| FitsError::InvalidValue {
                keyword,
                value: length.to_string(),
            })?;
            axes.push(length);
        }

        let pcount = header.get_int("PCOUNT").unwrap_or(0).max(0) as usize;
        let gcount = header.get_int("GCOUNT").unwrap_or(1).max(1) as usize;
        let count = if axes.is_empty() {
            0
        } else {
            axes.iter()
                .try_fold(1usize, |acc, &len| acc.checked_mul(len))
                .ok_or_else(|| size_overflow("NAXIS"))?
        };
        let byte_len = if count == 0 && pcount == 0 {
            0
        } else {
            pcount
                .checked_add(count)
                .and_then(|n| n.checked_mul(gcount))
                .and_then(|n| n.checked_mul(bytes_per_value))
                .ok_or_else(|| size_overflow("PCOUNT"))?
        };
        Ok(Self {
            bitpix,
            axes,
            count,
            byte_len,
        })
    }
}

fn size_overflow(keyword: &str) -> FitsError {
    FitsError::InvalidValue {
        keyword: keyword.to_string(),
        value: "data size does not fit in memory".to_string(),
    }
}

/// Decodes the first image HDU into an array in numpy axis order (`NAXISn, ..., NAXIS1`),
/// with `BSCALE`/`BZERO` applied and `BLANK` integers mapped to NaN.
pub fn decode_fits(bytes: &[u8]) -> Result<ArrayD<f64>, FitsError> {
    let mut offset = 0;
    let mut hdu = 0;
    while offset < bytes.len() {
        let rest = bytes.get(offset..).ok_or(FitsError::TruncatedHeader)?;
        let (header, header_len) = read_header(rest)?;
        if hdu == 0 && header.get_bool("SIMPLE") != Some(true) {
            return Err(FitsError::NotFits);
        }
        let unit = DataUnit::from_header(&header)?;
        // header_len is block-padded and may run past the end of a truncated file
        let data_start = offset + header_len;
        let data = bytes.get(data_start..).unwrap_or_default();

        let is_image = hdu == 0 || header.get_text("XTENSION") == Some("IMAGE");
        if is_image && unit.count > 0 {
            return decode_data(&header, &unit, data);
        }

        offset = unit
            .byte_len
            .div_ceil(BLOCK_SIZE)
            .checked_mul(BLOCK_SIZE)
            .and_then(|len| len.checked_add(data_start))
            .ok_or_else(|| size_overflow("NAXIS"))?;
        hdu += 1;
    }
    Err(FitsError::NoImage)
}

/// Parses header cards up to END. Returns the header and its padded length in bytes.
pub fn read_header(bytes: &[u8]) -> Result<(FitsHeader, usize), FitsError> {
    let mut header = FitsHeader::default();
    for (index, card) in bytes.chunks_exact(CARD_SIZE).enumerate() {
        let card = std::str::from_utf8(card)
            .ok()
            .filter(|card| card.is_ascii())
            .ok_or(FitsError::InvalidCard(index))?;
        let keyword = card[..8].trim_end();
        if keyword == "END" {
            return Ok((header, padded_len((index + 1) * CARD_SIZE)));
        }
        if keyword.is_empty() || &card[8..10] != "= " {
            continue;
        }
        if let Some(value) = parse_value(&card[10..]) {
            header.cards.push((keyword.to_string(), value));
        }
    }
    Err(FitsError::TruncatedHeader)
}

fn parse_value(raw: &str) -> Option<HeaderValue> {
    let raw = raw.trim_start();
    if let Some(rest) = raw.strip_prefix('\'') {
        // '' inside a string is an escaped quote
        let mut text = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    text.push('\'');
                    continue;
                }
                return Some(HeaderValue::Text(text.trim_end().to_string()));
            }
            text.push(ch);
        }
        return None;
    }

    let value = raw.split('/').next().unwrap_or_default().trim();
    match value {
        "" => None,
        "T" => Some(HeaderValue::Logical(true)),
        "F" => Some(HeaderValue::Logical(false)),
        _ => {
            if let Ok(int) = value.parse::<i64>() {
                return Some(HeaderValue::Integer(int));
            }
            value
                .replace(['D', 'd'], "E")
                .parse::<f64>()
                .ok()
                .map(HeaderValue::Float)
        }
    }
}

fn decode_data(
    header: &FitsHeader,
    unit: &DataUnit,
    data: &[u8],
) -> Result<ArrayD<f64>, FitsError> {
    let width = unit.bitpix.unsigned_abs() as usize / 8;
    let expected = unit
        .count
        .checked_mul(width)
        .ok_or_else(|| size_overflow("NAXIS"))?;
    if data.len() < expected {
        return Err(FitsError::TruncatedData {
            expected,
            found: data.len(),
        });
    }

    let bscale = header.get_float("BSCALE").unwrap_or(1.0);
    let bzero = header.get_float("BZERO").unwrap_or(0.0);
    let blank = header.get_int("BLANK");
    let scale = |raw: i64| match blank {
        Some(blank) if blank == raw => f64::NAN,
        _ => raw as f64 * bscale + bzero,
    };

    let chunks = data[..expected].chunks_exact(width);
    let values: Vec<f64> = match unit.bitpix {
        8 => chunks.map(|c| scale(i64::from(c[0]))).collect(),
        16 => chunks
            .map(|c| scale(i64::from(i16::from_be_bytes([c[0], c[1]]))))
            .collect(),
        32 => chunks
            .map(|c| scale(i64::from(i32::from_be_bytes([c[0], c[1], c[2], c[3]]))))
            .collect(),
        64 => chunks
            .map(|c| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(c);
                scale(i64::from_be_bytes(buf))
            })
            .collect(),
        -32 => chunks
            .map(|c| f64::from(f32::from_be_bytes([c[0], c[1], c[2], c[3]])) * bscale + bzero)
            .collect(),
        -64 => chunks
            .map(|c| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(c);
                f64::from_be_bytes(buf) * bscale + bzero
            })
            .collect(),
        other => return Err(FitsError::UnsupportedBitpix(other)),
    };

    let shape: Vec<usize> = unit.axes.iter().rev().copied().collect();
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|err| FitsError::InvalidValue {
        keyword: "NAXIS".to_string(),
        value: err.to_string(),
    })
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(text: &str) -> String {
        format!("{text:<80}")
    }

    fn header_block(cards: &[&str]) -> Vec<u8> {
        let mut text: String = cards.iter().map(|c| card(c)).collect();
        text.push_str(&card("END"));
        let mut bytes = text.into_bytes();
        bytes.resize(padded_len(bytes.len()), b' ');
        bytes
    }

    fn pad(mut data: Vec<u8>) -> Vec<u8> {
        data.resize(padded_len(data.len()), 0);
        data
    }

    #[test]
    fn decodes_primary_i16_with_scaling() {
        let mut bytes = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =                    3",
            "NAXIS2  =                    2",
            "BZERO   =                 10.0 / offset",
            "OBJECT  = 'J0001+0000'         / name",
        ]);
        let data: Vec<u8> = [1i16, 2, 3, 4, 5, -6]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        bytes.extend(pad(data));

        let array = decode_fits(&bytes).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[0, 0]], 11.0);
        assert_eq!(array[[1, 2]], 4.0);
    }

    #[test]
    fn falls_through_to_image_extension() {
        let mut bytes = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
            "EXTEND  =                    T",
        ]);
        bytes.extend(header_block(&[
            "XTENSION= 'IMAGE   '",
            "BITPIX  =                  -32",
            "NAXIS   =                    2",
            "NAXIS1  =                    2",
            "NAXIS2  =                    2",
            "PCOUNT  =                    0",
            "GCOUNT  =                    1",
            "EXTNAME = 'SCI'",
        ]));
        let data: Vec<u8> = [0.5f32, 1.5, 2.5, 3.5]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        bytes.extend(pad(data));

        let array = decode_fits(&bytes).unwrap();
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array[[1, 1]], 3.5);
    }

    #[test]
    fn rejects_truncated_and_foreign_files() {
        assert_eq!(decode_fits(b"not a fits file"), Err(FitsError::TruncatedHeader));

        let bytes = header_block(&["SIMPLE  =                    F", "BITPIX  =   8", "NAXIS = 0"]);
        assert_eq!(decode_fits(&bytes), Err(FitsError::NotFits));

        let bytes = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =                  100",
            "NAXIS2  =                  100",
        ]);
        assert!(matches!(
            decode_fits(&bytes),
            Err(FitsError::TruncatedData { .. })
        ));
    }

    #[test]
    fn unpadded_header_without_data_is_truncated() {
        let text: String = [
            "SIMPLE  =                    T",
            "BITPIX  =                  -32",
            "NAXIS   =                    2",
            "NAXIS1  =                    4",
            "NAXIS2  =                    4",
            "END",
        ]
        .iter()
        .map(|c| card(c))
        .collect();
        assert_eq!(text.len(), 480);
        assert_eq!(
            decode_fits(text.as_bytes()),
            Err(FitsError::TruncatedData {
                expected: 64,
                found: 0
            })
        );
    }

    #[test]
    fn oversized_axes_are_rejected() {
        let bytes = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                  -64",
            "NAXIS   =                    2",
            "NAXIS1  =         999999999999",
            "NAXIS2  =         999999999999",
        ]);
        assert!(matches!(
            decode_fits(&bytes),
            Err(FitsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn truncated_extension_header_is_reported() {
        // empty primary HDU followed by a cut-off extension
        let mut bytes = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]);
        bytes.extend_from_slice(card("XTENSION= 'IMAGE   '").as_bytes());
        assert_eq!(decode_fits(&bytes), Err(FitsError::TruncatedHeader));
    }

    #[test]
    fn quoted_strings_unescape() {
        assert_eq!(
            parse_value(" 'it''s'   / comment"),
            Some(HeaderValue::Text("it's".to_string()))
        );
        assert_eq!(parse_value(" 1.5D2"), Some(HeaderValue::Float(150.0)));
    }
}
