//! `CompletionClient` trait and its HTTP-backed implementations.

use crate::error::{CompletionError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A request to generate text from a model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
  pub model: String,
  pub prompt: String,
  pub timeout_secs: u64,
}

impl CompletionRequest {
  pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
    Self {
      model: model.into(),
      prompt: prompt.into(),
      timeout_secs: 120,
    }
  }

  pub fn with_timeout(mut self, secs: u64) -> Self {
    self.timeout_secs = secs;
    self
  }
}

/// A model's response, with enough usage metadata to feed truncation
/// detection.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
  pub text: String,
  pub finish_reason: Option<String>,
  pub tokens_used: Option<i64>,
}

/// Generates completions against a local or gateway-hosted model backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
  fn name(&self) -> &str;
  async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// Talks to a local Ollama-compatible `/api/generate` endpoint.
pub struct LocalClient {
  client: reqwest::Client,
  base_url: String,
}

impl LocalClient {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.into(),
    }
  }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
  response: String,
  #[serde(default)]
  done_reason: Option<String>,
  #[serde(default)]
  eval_count: Option<i64>,
}

#[async_trait]
impl CompletionClient for LocalClient {
  fn name(&self) -> &str {
    "local"
  }

  async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
    let body = OllamaRequest {
      model: &request.model,
      prompt: &request.prompt,
      stream: false,
    };

    let response = self
      .client
      .post(format!("{}/api/generate", self.base_url))
      .json(&body)
      .timeout(Duration::from_secs(request.timeout_secs))
      .send()
      .await?;

    if !response.status().is_success() {
      return Err(CompletionError::Backend(format!("status {}", response.status())));
    }

    let parsed: OllamaResponse = response.json().await?;
    if parsed.response.is_empty() {
      return Err(CompletionError::NoResponse);
    }

    Ok(CompletionResponse {
      text: parsed.response,
      finish_reason: parsed.done_reason,
      tokens_used: parsed.eval_count,
    })
  }
}

/// Talks to a remote gateway that fronts larger/cloud-hosted models,
/// timing out after `GATEWAY_DEFAULT_TIMEOUT` seconds by default.
pub const GATEWAY_DEFAULT_TIMEOUT_SECS: u64 = 300;

pub struct GatewayClient {
  client: reqwest::Client,
  base_url: String,
}

impl GatewayClient {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.into(),
    }
  }
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
  model: &'a str,
  prompt: &'a str,
}

#[derive(Deserialize)]
struct GatewayResponse {
  text: String,
  #[serde(default)]
  finish_reason: Option<String>,
  #[serde(default)]
  tokens_used: Option<i64>,
}

#[async_trait]
impl CompletionClient for GatewayClient {
  fn name(&self) -> &str {
    "gateway"
  }

  async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
    let timeout_secs = if request.timeout_secs == 0 {
      GATEWAY_DEFAULT_TIMEOUT_SECS
    } else {
      request.timeout_secs
    };

    let body = GatewayRequest {
      model: &request.model,
      prompt: &request.prompt,
    };

    let response = self
      .client
      .post(format!("{}/v1/complete", self.base_url))
      .json(&body)
      .timeout(Duration::from_secs(timeout_secs))
      .send()
      .await
      .map_err(|err| {
        if err.is_timeout() {
          CompletionError::Timeout(timeout_secs)
        } else {
          CompletionError::Request(err)
        }
      })?;

    if !response.status().is_success() {
      return Err(CompletionError::Backend(format!("status {}", response.status())));
    }

    let parsed: GatewayResponse = response.json().await?;
    Ok(CompletionResponse {
      text: parsed.text,
      finish_reason: parsed.finish_reason,
      tokens_used: parsed.tokens_used,
    })
  }
}
