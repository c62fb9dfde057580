//! Schema validation for a parsed enrichment response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One supporting citation the model attaches to a field it populated:
/// the field name and the line range (inclusive, 1-based) within the span
/// that backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
  pub field: String,
  pub lines: [u32; 2],
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentPayload {
  pub summary_120w: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub evidence: Vec<EvidenceEntry>,
  #[serde(default)]
  pub inputs: Vec<String>,
  #[serde(default)]
  pub outputs: Vec<String>,
  #[serde(default)]
  pub side_effects: Vec<String>,
  #[serde(default)]
  pub pitfalls: Vec<String>,
  #[serde(default)]
  pub usage_snippet: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("summary exceeds 120 words ({0} words)")]
  SummaryTooLong(usize),
  #[error("summary is empty")]
  SummaryEmpty,
  #[error("evidence is empty")]
  NoEvidence,
  #[error("evidence field {field:?} lines {lines:?} fall outside span range {span_start}-{span_end}")]
  EvidenceOutOfRange {
    field: String,
    lines: [u32; 2],
    span_start: u32,
    span_end: u32,
  },
}

/// Validates a parsed enrichment payload against the schema's invariants:
/// the summary is non-empty and at most 120 words, at least one evidence
/// entry is present, and every evidence entry's line range falls within
/// `[span_start_line, span_end_line]`.
pub fn validate_enrichment(
  payload: &EnrichmentPayload,
  span_start_line: u32,
  span_end_line: u32,
) -> Result<(), ValidationError> {
  let summary = payload.summary_120w.trim();
  if summary.is_empty() {
    return Err(ValidationError::SummaryEmpty);
  }
  let word_count = summary.split_whitespace().count();
  if word_count > 120 {
    return Err(ValidationError::SummaryTooLong(word_count));
  }
  if payload.evidence.is_empty() {
    return Err(ValidationError::NoEvidence);
  }
  for entry in &payload.evidence {
    let [start, end] = entry.lines;
    if start > end || start < span_start_line || end > span_end_line {
      return Err(ValidationError::EvidenceOutOfRange {
        field: entry.field.clone(),
        lines: entry.lines,
        span_start: span_start_line,
        span_end: span_end_line,
      });
    }
  }
  Ok(())
}
