use async_trait::async_trait;

/// Produces fixed-dimension vectors for passages (content being indexed) and
/// queries (search-time text). Most backends embed both the same way but the
/// API keeps them distinct since some models use asymmetric instructions.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, crate::EmbeddingError>;
  async fn embed_queries(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, crate::EmbeddingError>;
  async fn is_available(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("backend not available")]
  NotAvailable,
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("backend error: {0}")]
  BackendError(String),
  #[error("network error: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
}
