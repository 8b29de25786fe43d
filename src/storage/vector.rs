//! Embedding storage as little-endian f32 blobs.

use crate::error::StorageError;
use crate::Result;

/// Encode a vector as a blob.
#[must_use]
pub fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a blob written by [`vector_to_blob`].
///
/// # Errors
///
/// Returns an error if the blob length is not a multiple of 4.
pub fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(StorageError::Vector(format!(
            "invalid embedding blob of {} bytes",
            blob.len()
        ))
        .into());
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
