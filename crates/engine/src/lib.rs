//! Turns pending spans into enrichment and embedding rows: the planner reads
//! candidates off the store, the enrichment engine runs the tier-routed
//! completion loop, and the embedding engine fills in vectors per route.

pub mod embedding_engine;
pub mod enrichment;
pub mod error;
pub mod indexer;
pub mod ledger;
pub mod planner;
pub mod span_extractor;

pub use embedding_engine::{EmbeddingBatchOutcome, EmbeddingEngine};
pub use enrichment::{EnrichmentEngine, EnrichmentOutcome, TierModels};
pub use error::{EngineError, Result};
pub use indexer::{reindex_repo, IndexSummary};
pub use planner::{plan_embedding, plan_enrichment, DEFAULT_SNIPPET_MAX_CHARS};
pub use span_extractor::{detect_language, LineHeuristicExtractor, SpanCandidate, SpanExtractor};
