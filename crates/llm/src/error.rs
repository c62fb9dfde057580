use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("request timed out after {0}s")]
  Timeout(u64),

  #[error("backend returned an error: {0}")]
  Backend(String),

  #[error("no response content")]
  NoResponse,

  #[error("failed to parse JSON response: {0}")]
  Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CompletionError>;
