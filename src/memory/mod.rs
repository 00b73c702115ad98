pub mod chunks;
pub mod namespaces;
pub mod rank;
pub mod search;
pub mod service;
pub mod stats;
pub mod store;
pub mod types;

use crate::error::{EmbeddingError, StoreError};

/// Encode an embedding as little-endian `f32` bytes for the `chunks.embedding` BLOB.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`embedding_to_bytes`].
pub fn bytes_to_embedding(bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
    if bytes.len() % 4 != 0 {
        return Err(EmbeddingError::Malformed(format!(
            "stored embedding has {} bytes, not a multiple of 4",
            bytes.len()
        ))
        .into());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_round_trip() {
        let v = vec![0.25f32, -1.0, 3.5e-7, f32::MAX];
        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), v);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert!(bytes_to_embedding(&[0, 0, 0]).is_err());
    }
}
