//! Vector helpers for persisting summary embeddings.
//!
//! Stores keep vectors as BLOBs of little-endian `f32`s. Concrete
//! [`Embedder`](crate::traits::Embedder) implementations live in the
//! application crate.

use anyhow::{bail, Result};

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use narrative_chunker_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`]. Trailing partial words are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Reject vectors whose length differs from the model's dimensionality.
pub fn check_dims(vector: &[f32], dims: usize) -> Result<()> {
    if dims != 0 && vector.len() != dims {
        bail!(
            "embedding dimension mismatch: expected {}, got {}",
            dims,
            vector.len()
        );
    }
    Ok(())
}
