use crate::{EmbeddingBackend, EmbeddingError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Deterministic hash-based backend. Produces a stable vector from the text's
/// SHA-256 digest, stretched with repeated hashing until there are enough
/// bytes. Used for tests and for profiles that don't need real embeddings.
#[derive(Debug, Clone)]
pub struct HashBackend {
  dimensions: usize,
}

impl HashBackend {
  pub fn new(dimensions: usize) -> Self {
    Self {
      dimensions: dimensions.max(1),
    }
  }
}

fn hash_to_vector(text: &str, dim: usize) -> Vec<f32> {
  let mut digest = Sha256::digest(text.as_bytes()).to_vec();
  let needed = dim * 2;
  while digest.len() < needed {
    let next = Sha256::digest(&digest);
    digest.extend_from_slice(&next);
  }

  (0..dim)
    .map(|i| {
      let hi = digest[2 * i] as u16;
      let lo = digest[2 * i + 1] as u16;
      let value = ((hi << 8) | lo) as f32;
      (value / 65535.0) * 2.0 - 1.0
    })
    .collect()
}

#[async_trait]
impl EmbeddingBackend for HashBackend {
  fn name(&self) -> &str {
    "hash"
  }

  fn model_id(&self) -> &str {
    "hash-v1"
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    Ok(texts.iter().map(|t| hash_to_vector(t, self.dimensions)).collect())
  }

  async fn embed_queries(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.embed_passages(texts).await
  }

  async fn is_available(&self) -> bool {
    true
  }
}
