//! LLM completion clients and response handling for span enrichment.
//!
//! Talks to a local Ollama-compatible backend or a remote gateway, and
//! provides the prompt template, JSON extraction, and schema validation
//! that turn a raw completion into a usable enrichment payload.

pub mod client;
pub mod error;
pub mod json;
pub mod prompt;
pub mod validate;

pub use client::{
  CompletionClient, CompletionRequest, CompletionResponse, GatewayClient, LocalClient, GATEWAY_DEFAULT_TIMEOUT_SECS,
};
pub use error::{CompletionError, Result};
pub use json::{extract_outermost_object, parse_json};
pub use prompt::{build_enrichment_prompt, EnrichmentContext, ENRICHMENT_SCHEMA_VERSION};
pub use validate::{validate_enrichment, EnrichmentPayload, EvidenceEntry, ValidationError};
