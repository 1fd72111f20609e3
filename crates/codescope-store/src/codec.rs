//! Byte-exact codec for dense embedding vectors.
//!
//! Vectors are stored as opaque blobs: each `f32` component is encoded as 4
//! little-endian bytes, back to back. The dimension is not recorded alongside
//! the blob; callers enforce consistency against `cache_metadata.embedding_dimensions`.

use crate::error::{Result, StoreError};

/// Serializes a float32 vector to its little-endian byte representation.
pub fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for component in vector {
        bytes.extend_from_slice(&component.to_le_bytes());
    }
    bytes
}

/// Parses a little-endian embedding blob back into a float32 vector.
///
/// An empty slice decodes to an empty (non-null) vector. Any length not a
/// multiple of 4 is rejected as [`StoreError::CorruptEmbedding`].
pub fn deserialize_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    deserialize_embedding_ctx(bytes, "embedding")
}

pub(crate) fn deserialize_embedding_ctx(bytes: &[u8], context: &str) -> Result<Vec<f32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(StoreError::CorruptEmbedding {
            len: bytes.len(),
            context: context.to_string(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let raw: [u8; 4] = chunk.try_into().expect("chunks_exact guarantees 4 bytes");
            f32::from_le_bytes(raw)
        })
        .collect())
}
