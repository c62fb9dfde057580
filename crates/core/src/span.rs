//! File, span, enrichment, embedding, and graph-edge records that make up
//! the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A tracked source file within a repo's index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
  pub id: i64,
  pub path: String,
  pub lang: String,
  pub file_hash: String,
  pub size: u64,
  pub mtime: f64,
}

/// A content-addressed extracted span (function, class, block) within a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
  pub id: i64,
  pub file_id: i64,
  pub symbol: String,
  pub kind: String,
  pub start_line: u32,
  pub end_line: u32,
  pub byte_start: u64,
  pub byte_end: u64,
  pub span_hash: String,
  pub doc_hint: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// `sha256(lang || 0x00 || span_bytes)`, hex-encoded.
pub fn span_hash(lang: &str, span_bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(lang.as_bytes());
  hasher.update([0u8]);
  hasher.update(span_bytes);
  hex::encode(hasher.finalize())
}

/// One supporting citation for an enrichment field: the field it backs and
/// the line range (inclusive, 1-based) within the span that supports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
  pub field: String,
  pub lines: [u32; 2],
}

/// LLM-generated per-span documentation, keyed by `span_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRecord {
  pub span_hash: String,
  pub summary: String,
  pub tags: Vec<String>,
  pub evidence: Vec<EvidenceEntry>,
  pub model: String,
  pub created_at: DateTime<Utc>,
  pub schema_ver: String,
  pub inputs: Vec<String>,
  pub outputs: Vec<String>,
  pub side_effects: Vec<String>,
  pub pitfalls: Vec<String>,
  pub usage_snippet: String,
}

/// A vector embedding for a span under a given route/table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
  pub span_hash: String,
  pub route: String,
  pub profile_name: String,
  pub vector: Vec<f32>,
}

/// A directed edge linking a span to a technical-document node in the
/// external knowledge graph (populated by a collaborator, not this crate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
  pub span_hash: String,
  pub doc_id: String,
  pub relation: String,
  pub weight: f32,
}
