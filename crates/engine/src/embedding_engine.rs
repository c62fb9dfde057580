//! Per-route embedding loop: reads pending spans, embeds them as passages,
//! and stores the resulting vectors. Unlike enrichment there is no tier
//! router and no in-job retry; a failure is simply left for the next cycle.

use crate::error::Result;
use llmc_core::EmbeddingWorkItem;
use llmc_embedding::EmbeddingBackend;
use llmc_store::IndexStore;
use std::sync::Arc;

pub struct EmbeddingEngine {
  backend: Arc<dyn EmbeddingBackend>,
  route: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingBatchOutcome {
  pub embedded: usize,
  pub failed: usize,
}

impl EmbeddingEngine {
  pub fn new(backend: Arc<dyn EmbeddingBackend>, route: impl Into<String>) -> Self {
    Self {
      backend,
      route: route.into(),
    }
  }

  pub fn route(&self) -> &str {
    &self.route
  }

  /// Embeds every item in `items` one at a time and stores each vector as
  /// soon as it's ready. A single backend failure is logged and counted,
  /// not propagated, since the remaining items in the batch are unaffected.
  pub async fn embed_batch(&self, store: &IndexStore, items: &[EmbeddingWorkItem]) -> Result<EmbeddingBatchOutcome> {
    if items.is_empty() {
      return Ok(EmbeddingBatchOutcome::default());
    }

    store.ensure_embedding_meta(self.backend.model_id(), self.backend.dimensions())?;

    let mut outcome = EmbeddingBatchOutcome::default();
    for item in items {
      match self.backend.embed_passages(&[item.text.as_str()]).await {
        Ok(mut vectors) => {
          let Some(vector) = vectors.pop() else {
            tracing::warn!(span_hash = %item.span_hash, "embedding backend returned no vector");
            outcome.failed += 1;
            continue;
          };
          store.store_embedding(&item.span_hash, &item.route, item.profile.as_deref(), &vector)?;
          outcome.embedded += 1;
        }
        Err(err) => {
          tracing::warn!(span_hash = %item.span_hash, route = %item.route, error = %err, "embedding request failed");
          outcome.failed += 1;
        }
      }
    }
    Ok(outcome)
  }
}
