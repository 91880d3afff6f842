//! Embedding blob format: little-endian `f32`, with `f64` accepted on read.

use roster_core::Embedding;

pub fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    embedding
        .values
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

/// Decode a stored blob given the declared vector length.
///
/// A blob that is neither `declared_len` f32s nor `declared_len` f64s
/// decodes to an empty vector; the gallery cache drops such rows. So does
/// a declared length too large to describe any blob.
pub fn decode_encoding(blob: &[u8], declared_len: usize) -> Vec<f32> {
    if declared_len.checked_mul(4) == Some(blob.len()) {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    } else if declared_len.checked_mul(8) == Some(blob.len()) {
        blob.chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect()
    } else {
        Vec::new()
    }
}
