pub mod gateway;
pub mod hash;
pub mod ollama;
pub mod provider;
pub mod resilient;

pub use gateway::GatewayBackend;
pub use hash::HashBackend;
pub use ollama::{OllamaBackend, OllamaHealthStatus};
pub use provider::{EmbeddingBackend, EmbeddingError};
pub use resilient::{is_retryable_error, wrap_resilient, wrap_resilient_arc, ResilientBackend, RetryConfig};
