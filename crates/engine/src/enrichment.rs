//! Per-span enrichment loop: tier selection, completion, JSON extraction,
//! normalization, validation, and the promote-once retry discipline from
//! §4.6 of the design notes.

use crate::error::Result;
use crate::ledger;
use chrono::Utc;
use llmc_core::{EnrichmentRecord, EnrichmentWorkItem, LedgerMetrics, LedgerRecord, RepoId};
use llmc_llm::{
  CompletionClient, CompletionRequest, EnrichmentContext, EnrichmentPayload, ValidationError,
  ENRICHMENT_SCHEMA_VERSION, build_enrichment_prompt, extract_outermost_object, validate_enrichment,
};
use llmc_router::{
  FailureKind, RouterConfig, SpanMetrics, Tier, choose_next_tier_on_failure, choose_start_tier,
  clamp_usage_snippet, detect_truncation, estimate_json_nodes_and_depth, estimate_nesting_depth,
  estimate_tokens_from_text, expected_output_tokens,
};
use llmc_store::IndexStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Concrete model name to dispatch to per tier.
#[derive(Debug, Clone)]
pub struct TierModels {
  pub seven: String,
  pub fourteen: String,
  pub nano: String,
}

impl Default for TierModels {
  fn default() -> Self {
    Self {
      seven: "qwen2.5:7b-instruct".to_string(),
      fourteen: "qwen2.5:14b-instruct-q4_K_M".to_string(),
      nano: "gateway-nano".to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
  Success { tier_used: Tier, attempts: u32 },
  Failure { reason: FailureKind, attempts: u32 },
}

pub struct EnrichmentEngine {
  router_config: RouterConfig,
  models: TierModels,
  local_client: Arc<dyn CompletionClient>,
  gateway_client: Arc<dyn CompletionClient>,
}

impl EnrichmentEngine {
  pub fn new(
    router_config: RouterConfig,
    models: TierModels,
    local_client: Arc<dyn CompletionClient>,
    gateway_client: Arc<dyn CompletionClient>,
  ) -> Self {
    Self {
      router_config,
      models,
      local_client,
      gateway_client,
    }
  }

  fn client_and_model(&self, tier: Tier) -> (&Arc<dyn CompletionClient>, &str) {
    match tier {
      Tier::Nano => (&self.gateway_client, self.models.nano.as_str()),
      Tier::Seven => (&self.local_client, self.models.seven.as_str()),
      Tier::Fourteen => (&self.local_client, self.models.fourteen.as_str()),
    }
  }

  /// Runs the full loop for one span: compute metrics, pick a start tier,
  /// call the completion client, extract/validate the response, and
  /// promote to the next tier on failure until a tier is revisited (unless
  /// `promote_once` is disabled) or `choose_next_tier_on_failure` gives up.
  pub async fn enrich(
    &self,
    store: &IndexStore,
    workspace: &Path,
    repo_id: &RepoId,
    item: &EnrichmentWorkItem,
    span_start_line: u32,
    span_end_line: u32,
  ) -> Result<EnrichmentOutcome> {
    let metrics = compute_metrics(&item.snippet);
    let mut current_tier = choose_start_tier(&metrics, &self.router_config);
    let mut tiers_history: Vec<Tier> = Vec::new();
    let mut attempt: u32 = 0;

    loop {
      let attempt_start = Instant::now();
      attempt += 1;
      tiers_history.push(current_tier);
      let promo = self.promo_label(&tiers_history);

      let (client, model) = self.client_and_model(current_tier);
      let ctx = EnrichmentContext {
        lang: &item.lang,
        symbol: &item.symbol,
        file_path: &item.file_path,
        snippet: &item.snippet,
      };
      let prompt = build_enrichment_prompt(&ctx);
      let timeout_secs = if current_tier == Tier::Nano {
        llmc_llm::GATEWAY_DEFAULT_TIMEOUT_SECS
      } else {
        120
      };
      let request = CompletionRequest::new(model, prompt).with_timeout(timeout_secs);

      let response = match client.complete(request).await {
        Ok(response) => response,
        Err(err) => {
          tracing::warn!(span_hash = %item.span_hash, tier = current_tier.as_str(), error = %err, "completion request failed");
          self.log_attempt(
            workspace,
            repo_id,
            item,
            current_tier,
            attempt,
            &metrics,
            attempt_start.elapsed(),
            &promo,
            Some(FailureKind::Runtime),
          );
          match self.next_tier(FailureKind::Runtime, current_tier, &tiers_history) {
            Some(next) => {
              current_tier = next;
              continue;
            }
            None => return Ok(self.give_up(workspace, &item.span_hash, FailureKind::Runtime, "", attempt)),
          }
        }
      };

      let raw = response.text;
      let Some(json_str) = extract_outermost_object(&raw) else {
        let failure = classify_parse_failure(&raw, response.tokens_used, response.finish_reason.as_deref());
        self.log_attempt(
          workspace,
          repo_id,
          item,
          current_tier,
          attempt,
          &metrics,
          attempt_start.elapsed(),
          &promo,
          Some(failure),
        );
        match self.next_tier(failure, current_tier, &tiers_history) {
          Some(next) => {
            current_tier = next;
            continue;
          }
          None => return Ok(self.give_up(workspace, &item.span_hash, failure, &raw, attempt)),
        }
      };

      let mut payload: EnrichmentPayload = match serde_json::from_str(json_str) {
        Ok(payload) => payload,
        Err(_) => {
          let failure = classify_parse_failure(&raw, response.tokens_used, response.finish_reason.as_deref());
          self.log_attempt(
            workspace,
            repo_id,
            item,
            current_tier,
            attempt,
            &metrics,
            attempt_start.elapsed(),
            &promo,
            Some(failure),
          );
          match self.next_tier(failure, current_tier, &tiers_history) {
            Some(next) => {
              current_tier = next;
              continue;
            }
            None => return Ok(self.give_up(workspace, &item.span_hash, failure, &raw, attempt)),
          }
        }
      };

      normalize(&mut payload, span_start_line, span_end_line);

      if let Err(validation_err) = validate_enrichment(&payload, span_start_line, span_end_line) {
        let failure = classify_validation_failure(&validation_err);
        self.log_attempt(
          workspace,
          repo_id,
          item,
          current_tier,
          attempt,
          &metrics,
          attempt_start.elapsed(),
          &promo,
          Some(failure),
        );
        match self.next_tier(failure, current_tier, &tiers_history) {
          Some(next) => {
            current_tier = next;
            continue;
          }
          None => return Ok(self.give_up(workspace, &item.span_hash, failure, &raw, attempt)),
        }
      }

      let enrichment = EnrichmentRecord {
        span_hash: item.span_hash.clone(),
        summary: payload.summary_120w,
        tags: payload.tags,
        evidence: payload.evidence.into_iter().map(convert_evidence_entry).collect(),
        model: model.to_string(),
        created_at: Utc::now(),
        schema_ver: ENRICHMENT_SCHEMA_VERSION.to_string(),
        inputs: payload.inputs,
        outputs: payload.outputs,
        side_effects: payload.side_effects,
        pitfalls: payload.pitfalls,
        usage_snippet: payload.usage_snippet,
      };
      store.store_enrichment(&enrichment)?;
      self.log_attempt(
        workspace,
        repo_id,
        item,
        current_tier,
        attempt,
        &metrics,
        attempt_start.elapsed(),
        &promo,
        None,
      );
      return Ok(EnrichmentOutcome::Success {
        tier_used: current_tier,
        attempts: attempt,
      });
    }
  }

  fn next_tier(&self, failure: FailureKind, current: Tier, history: &[Tier]) -> Option<Tier> {
    let next = choose_next_tier_on_failure(failure, current)?;
    if self.router_config.promote_once && history.contains(&next) {
      None
    } else {
      Some(next)
    }
  }

  /// Describes the tier transition that produced the attempt currently
  /// being logged, e.g. `"7b->14b"`, or `"none"` for a first attempt.
  fn promo_label(&self, history: &[Tier]) -> String {
    if history.len() < 2 {
      "none".to_string()
    } else {
      format!(
        "{}->{}",
        history[history.len() - 2].as_str(),
        history[history.len() - 1].as_str()
      )
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn log_attempt(
    &self,
    workspace: &Path,
    repo_id: &RepoId,
    item: &EnrichmentWorkItem,
    tier: Tier,
    attempt: u32,
    metrics: &SpanMetrics,
    wall: std::time::Duration,
    promo: &str,
    failure: Option<FailureKind>,
  ) {
    ledger::append(
      workspace,
      &LedgerRecord {
        span_hash: item.span_hash.clone(),
        repo_id: repo_id.clone(),
        path: item.file_path.clone(),
        tier: tier.as_str().to_string(),
        attempt,
        outcome: if failure.is_some() { "fail".to_string() } else { "pass".to_string() },
        failure_kind: failure.map(|f| f.as_str().to_string()),
        metrics: LedgerMetrics {
          line_count: metrics.line_count,
          nesting_depth: metrics.nesting_depth,
          tokens_in: metrics.tokens_in,
          tokens_out: metrics.tokens_out,
        },
        wall_ms: wall.as_millis() as u64,
        promo: promo.to_string(),
        timestamp: Utc::now(),
      },
    );
  }

  fn give_up(
    &self,
    workspace: &Path,
    span_hash: &str,
    reason: FailureKind,
    raw_output: &str,
    attempts: u32,
  ) -> EnrichmentOutcome {
    if matches!(reason, FailureKind::Truncation | FailureKind::Parse) && !raw_output.is_empty() {
      ledger::quarantine(workspace, span_hash, raw_output);
    }
    EnrichmentOutcome::Failure { reason, attempts }
  }
}

fn convert_evidence_entry(entry: llmc_llm::EvidenceEntry) -> llmc_core::EvidenceEntry {
  llmc_core::EvidenceEntry {
    field: entry.field,
    lines: entry.lines,
  }
}

fn compute_metrics(snippet: &str) -> SpanMetrics {
  let (node_count, schema_depth) = estimate_json_nodes_and_depth(snippet);
  SpanMetrics {
    tokens_in: estimate_tokens_from_text(snippet),
    tokens_out: expected_output_tokens(8, snippet),
    node_count,
    schema_depth,
    array_elements: 0,
    csv_columns: 0,
    line_count: snippet.lines().count() as u64,
    nesting_depth: estimate_nesting_depth(snippet),
    rag_k: None,
    rag_avg_score: None,
  }
}

fn classify_parse_failure(raw: &str, tokens_used: Option<i64>, finish_reason: Option<&str>) -> FailureKind {
  if detect_truncation(raw, tokens_used, finish_reason) {
    FailureKind::Truncation
  } else {
    FailureKind::Parse
  }
}

fn classify_validation_failure(err: &ValidationError) -> FailureKind {
  match err {
    ValidationError::NoEvidence => FailureKind::NoEvidence,
    ValidationError::SummaryTooLong(_) | ValidationError::SummaryEmpty | ValidationError::EvidenceOutOfRange { .. } => {
      FailureKind::Validation
    }
  }
}

/// Field names checked for evidence backfill, in the order they're
/// reported if the model left them populated but cited nothing.
const BACKFILLABLE_FIELDS: &[&str] = &["tags", "inputs", "outputs", "side_effects", "pitfalls"];

/// Clamps `usage_snippet` to 12 lines and, when the model left `evidence`
/// empty, backfills one `{field, lines}` entry per populated field with
/// the span's line range so a downstream reader always has something to
/// point at.
fn normalize(payload: &mut EnrichmentPayload, start_line: u32, end_line: u32) {
  clamp_usage_snippet(&mut payload.usage_snippet, 12);
  if payload.evidence.is_empty() {
    let populated: Vec<&str> = BACKFILLABLE_FIELDS
      .iter()
      .copied()
      .filter(|field| match *field {
        "tags" => !payload.tags.is_empty(),
        "inputs" => !payload.inputs.is_empty(),
        "outputs" => !payload.outputs.is_empty(),
        "side_effects" => !payload.side_effects.is_empty(),
        "pitfalls" => !payload.pitfalls.is_empty(),
        _ => false,
      })
      .collect();
    let fields: Vec<&str> = if populated.is_empty() { vec!["summary_120w"] } else { populated };
    for field in fields {
      payload.evidence.push(llmc_llm::EvidenceEntry {
        field: field.to_string(),
        lines: [start_line, end_line],
      });
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn blank_payload(summary: &str) -> EnrichmentPayload {
    EnrichmentPayload {
      summary_120w: summary.to_string(),
      tags: vec![],
      evidence: vec![],
      inputs: vec![],
      outputs: vec![],
      side_effects: vec![],
      pitfalls: vec![],
      usage_snippet: String::new(),
    }
  }

  #[test]
  fn normalize_backfills_evidence_from_span_range() {
    let mut payload = blank_payload("does a thing");
    payload.tags = vec!["x".to_string()];
    normalize(&mut payload, 10, 20);
    assert_eq!(
      payload.evidence,
      vec![llmc_llm::EvidenceEntry {
        field: "tags".to_string(),
        lines: [10, 20],
      }]
    );
  }

  #[test]
  fn normalize_backfills_summary_when_nothing_else_is_populated() {
    let mut payload = blank_payload("does a thing");
    normalize(&mut payload, 1, 2);
    assert_eq!(
      payload.evidence,
      vec![llmc_llm::EvidenceEntry {
        field: "summary_120w".to_string(),
        lines: [1, 2],
      }]
    );
  }

  #[test]
  fn normalize_backfills_one_entry_per_populated_field() {
    let mut payload = blank_payload("does a thing");
    payload.inputs = vec!["a".to_string()];
    payload.outputs = vec!["b".to_string()];
    normalize(&mut payload, 3, 4);
    assert_eq!(payload.evidence.len(), 2);
    assert!(payload.evidence.iter().all(|e| e.lines == [3, 4]));
  }

  #[test]
  fn normalize_clamps_long_usage_snippet() {
    let mut payload = blank_payload("does a thing");
    payload.evidence = vec![llmc_llm::EvidenceEntry {
      field: "summary_120w".to_string(),
      lines: [1, 2],
    }];
    payload.usage_snippet = (0..20).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
    normalize(&mut payload, 1, 2);
    assert_eq!(payload.usage_snippet.lines().count(), 12);
  }

  #[test]
  fn classify_validation_maps_no_evidence() {
    assert_eq!(classify_validation_failure(&ValidationError::NoEvidence), FailureKind::NoEvidence);
    assert_eq!(
      classify_validation_failure(&ValidationError::SummaryEmpty),
      FailureKind::Validation
    );
  }

  #[test]
  fn parse_failure_detects_truncation_over_parse() {
    assert_eq!(classify_parse_failure("{\"a\": 1", None, None), FailureKind::Truncation);
    assert_eq!(classify_parse_failure("not json at all", None, None), FailureKind::Parse);
  }
}
