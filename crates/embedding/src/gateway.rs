use crate::{EmbeddingBackend, EmbeddingError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Embedding backend for a remote gateway exposing an OpenAI-style
/// `/v1/embeddings` endpoint, for profiles that need a larger hosted model
/// than a local Ollama instance provides.
#[derive(Debug, Clone)]
pub struct GatewayBackend {
  client: reqwest::Client,
  base_url: String,
  api_key: String,
  model: String,
  dimensions: usize,
}

impl GatewayBackend {
  pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.into(),
      api_key: api_key.into(),
      model: model.into(),
      dimensions,
    }
  }

  fn embeddings_url(&self) -> String {
    format!("{}/v1/embeddings", self.base_url)
  }

  async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let request = EmbeddingRequest {
      model: &self.model,
      input: texts.to_vec(),
    };

    debug!("embedding {} texts via gateway", texts.len());

    let response = self
      .client
      .post(self.embeddings_url())
      .header("Authorization", format!("Bearer {}", self.api_key))
      .json(&request)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("gateway embedding failed: {} - {}", status, body);
      return Err(EmbeddingError::BackendError(format!("gateway returned {}: {}", status, body)));
    }

    let result: EmbeddingResponse = response.json().await?;
    Ok(result.data.into_iter().map(|d| d.embedding).collect())
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for GatewayBackend {
  fn name(&self) -> &str {
    "gateway"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.embed(texts).await
  }

  async fn embed_queries(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.embed(texts).await
  }

  async fn is_available(&self) -> bool {
    !self.api_key.is_empty()
  }
}
