//! Minimal reader for NumPy `.npy` tensors.
//!
//! Only little-endian `<f4` and `<f2` payloads in C order are accepted, which
//! covers every voice bank we ship. Half-precision values are widened to f32
//! bit-for-bit (see [`f16_to_f32`]).

use crate::error::{SynthesisError, SynthesisResult};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Element type declared in an `.npy` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpyDtype {
    F16,
    F32,
}

impl NpyDtype {
    fn width(self) -> usize {
        match self {
            NpyDtype::F16 => 2,
            NpyDtype::F32 => 4,
        }
    }
}

/// A parsed `.npy` payload, always widened to f32.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub dtype: NpyDtype,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Parse an in-memory `.npy` file.
pub fn parse(bytes: &[u8]) -> SynthesisResult<NpyArray> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(SynthesisError::Format("invalid npy magic header".to_string()));
    }

    let major = bytes[6];
    let (header_len, header_offset) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(SynthesisError::Format("npy payload too small".to_string()));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        other => {
            return Err(SynthesisError::Format(format!(
                "unsupported npy version {}",
                other
            )))
        }
    };

    let header_end = header_offset + header_len;
    if bytes.len() < header_end {
        return Err(SynthesisError::Format(
            "npy header length exceeds payload size".to_string(),
        ));
    }
    let header = std::str::from_utf8(&bytes[header_offset..header_end])
        .map_err(|_| SynthesisError::Format("npy header is not valid UTF-8".to_string()))?;

    let descr = header_field(header, "descr")
        .ok_or_else(|| SynthesisError::Format("npy header missing 'descr'".to_string()))?;
    let dtype = match descr {
        "<f2" | "|f2" => NpyDtype::F16,
        "<f4" | "|f4" => NpyDtype::F32,
        other => {
            return Err(SynthesisError::Format(format!(
                "unsupported npy dtype '{}'",
                other
            )))
        }
    };

    if header_field(header, "fortran_order") == Some("True") {
        return Err(SynthesisError::Format(
            "Fortran-ordered npy arrays are not supported".to_string(),
        ));
    }

    let shape = parse_shape(header)
        .ok_or_else(|| SynthesisError::Format("npy header missing 'shape'".to_string()))?;
    let needed = shape
        .iter()
        .try_fold(dtype.width(), |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| SynthesisError::Format(format!("npy shape overflow: {:?}", shape)))?;

    let payload = &bytes[header_end..];
    if payload.len() < needed {
        return Err(SynthesisError::Format(format!(
            "npy data truncated: expected {} bytes, got {}",
            needed,
            payload.len()
        )));
    }

    let data = match dtype {
        NpyDtype::F16 => payload[..needed]
            .chunks_exact(2)
            .map(|c| f16_to_f32(u16::from_le_bytes([c[0], c[1]])))
            .collect(),
        NpyDtype::F32 => payload[..needed]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    };

    Ok(NpyArray { dtype, shape, data })
}

/// Widen an IEEE 754 half-precision value to single precision.
///
/// Zero keeps its sign, subnormals are renormalized, infinities stay
/// infinite and NaN payloads are preserved in the high mantissa bits.
pub fn f16_to_f32(h: u16) -> f32 {
    let sign = ((h >> 15) & 1) as u32;
    let mut exp = ((h >> 10) & 0x1f) as u32;
    let mut mant = (h & 0x3ff) as u32;

    let bits = if exp == 0 {
        if mant == 0 {
            sign << 31
        } else {
            // Subnormal: shift until the implicit leading bit appears.
            let mut shift = 0u32;
            while mant & 0x400 == 0 {
                mant <<= 1;
                shift += 1;
            }
            mant &= 0x3ff;
            exp = 127 - 15 + 1 - shift;
            (sign << 31) | (exp << 23) | (mant << 13)
        }
    } else if exp == 0x1f {
        if mant == 0 {
            (sign << 31) | 0x7f80_0000
        } else {
            (sign << 31) | 0x7fc0_0000 | (mant << 13)
        }
    } else {
        (sign << 31) | ((exp + 127 - 15) << 23) | (mant << 13)
    };

    f32::from_bits(bits)
}

fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let start = header
        .find(&pattern)
        .or_else(|| header.find(&format!("\"{}\":", key)))?
        + pattern.len();
    let rest = header[start..].trim_start();

    if let Some(stripped) = rest.strip_prefix('\'') {
        let end = stripped.find('\'')?;
        return Some(&stripped[..end]);
    }
    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        return Some(&stripped[..end]);
    }

    let end = rest.find([',', '}']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let start = header
        .find("'shape':")
        .or_else(|| header.find("\"shape\":"))?;
    let rest = &header[start..];
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;

    let mut shape = Vec::new();
    for part in rest[open + 1..close].split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        shape.push(trimmed.parse::<usize>().ok()?);
    }

    // A scalar array has shape () and one element.
    if shape.is_empty() {
        shape.push(1);
    }
    Some(shape)
}

/// Encode an f32 array as a version 1.0 `.npy` file.
///
/// Used to build voice-bank fixtures.
pub fn encode_f32(shape: &[usize], data: &[f32]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(data.len() * 4);
    for v in data {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    encode_raw("<f4", shape, &payload)
}

/// Encode raw half-precision bit patterns as a version 1.0 `.npy` file.
pub fn encode_f16_bits(shape: &[usize], bits: &[u16]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(bits.len() * 2);
    for b in bits {
        payload.extend_from_slice(&b.to_le_bytes());
    }
    encode_raw("<f2", shape, &payload)
}

fn encode_raw(descr: &str, shape: &[usize], payload: &[u8]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_text = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape_text
    );
    // Pad so that magic + version + len + header is a multiple of 64.
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(10 + header.len() + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}
