use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("Sqlite: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("IO: {0}")]
  Io(#[from] std::io::Error),

  #[error("Yaml: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("Json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Corrupt store at {path}: {reason}")]
  Corrupt { path: String, reason: String },

  #[error("Not found: {0}")]
  NotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
