use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("completion request failed: {0}")]
  Completion(#[from] llmc_llm::CompletionError),

  #[error("embedding backend failed: {0}")]
  Embedding(#[from] llmc_embedding::EmbeddingError),

  #[error("store error: {0}")]
  Store(#[from] llmc_store::StoreError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("config error: {0}")]
  Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
