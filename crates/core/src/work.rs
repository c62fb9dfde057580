//! Scheduling units: jobs dispatched per tick, control-surface events, and
//! enrichment-engine work items and ledger records.

use crate::repo::{RepoDescriptor, RepoId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One refresh job dispatched to the worker pool for a single tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
  pub job_id: String,
  pub repo: RepoDescriptor,
  pub force: bool,
}

pub fn make_job_id() -> String {
  use std::time::{SystemTime, UNIX_EPOCH};
  let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
  format!("job-{nanos:x}")
}

/// Outcome of a completed job, fed back into the state store.
#[derive(Debug, Clone)]
pub struct JobResult {
  pub repo_id: RepoId,
  pub success: bool,
  pub exit_code: i32,
  pub error_reason: Option<String>,
  pub summary: Option<serde_json::Value>,
  pub stdout_tail: String,
  pub stderr_tail: String,
}

/// Flags read from the control surface during a single tick, consumed
/// exactly once.
#[derive(Debug, Clone, Default)]
pub struct ControlEvents {
  pub shutdown: bool,
  pub refresh_all: bool,
  pub refresh_repo_ids: Vec<RepoId>,
}

/// One span queued for LLM enrichment.
#[derive(Debug, Clone)]
pub struct EnrichmentWorkItem {
  pub span_hash: String,
  pub file_path: String,
  pub lang: String,
  pub symbol: String,
  pub snippet: String,
}

/// One span queued for embedding under a given route.
#[derive(Debug, Clone)]
pub struct EmbeddingWorkItem {
  pub span_hash: String,
  pub route: String,
  pub profile: Option<String>,
  pub text: String,
}

/// Per-attempt span metrics captured alongside a ledger row, matching the
/// measurements the router used to pick a tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerMetrics {
  pub line_count: u64,
  pub nesting_depth: u64,
  pub tokens_in: u64,
  pub tokens_out: u64,
}

/// Append-only record of one enrichment attempt, for observability and
/// tier-router tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
  pub span_hash: String,
  pub repo_id: RepoId,
  pub path: String,
  pub tier: String,
  pub attempt: u32,
  pub outcome: String,
  pub failure_kind: Option<String>,
  pub metrics: LedgerMetrics,
  pub wall_ms: u64,
  /// Tier transition that produced this attempt, e.g. `"7b->14b"`, or
  /// `"none"` if this attempt didn't follow a promotion.
  pub promo: String,
  pub timestamp: DateTime<Utc>,
}
