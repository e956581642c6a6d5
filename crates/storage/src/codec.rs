//! Fixed-width encoding of numeric sequences.
//!
//! Each `f64` is written as 8 little-endian bytes, concatenated in order, so
//! decoding depends only on the blob length.

use crate::{CacheError, CacheResult};

/// Bytes per encoded `f64`.
pub const F64_WIDTH: usize = std::mem::size_of::<f64>();

/// Encode a sequence of doubles.
pub fn encode_f64s(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * F64_WIDTH);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a blob produced by [`encode_f64s`].
///
/// A length that is not a multiple of 8 is an error; no partial array is returned.
pub fn decode_f64s(bytes: &[u8]) -> CacheResult<Vec<f64>> {
    if bytes.len() % F64_WIDTH != 0 {
        return Err(CacheError::Decode {
            len: bytes.len(),
            width: F64_WIDTH,
        });
    }
    Ok(bytes
        .chunks_exact(F64_WIDTH)
        .map(|chunk| {
            let mut buf = [0u8; F64_WIDTH];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect())
}
