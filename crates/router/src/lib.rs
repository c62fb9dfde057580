//! Pure tier-selection functions for the enrichment engine: picks a starting
//! model tier from span metrics and decides whether a failed attempt should
//! retry at a different tier.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model tier, cheapest/fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  Nano,
  #[serde(rename = "7b")]
  Seven,
  #[serde(rename = "14b")]
  Fourteen,
}

impl Tier {
  pub fn as_str(&self) -> &'static str {
    match self {
      Tier::Nano => "nano",
      Tier::Seven => "7b",
      Tier::Fourteen => "14b",
    }
  }
}

impl std::str::FromStr for Tier {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "nano" => Ok(Tier::Nano),
      "7b" => Ok(Tier::Seven),
      "14b" => Ok(Tier::Fourteen),
      _ => Err(()),
    }
  }
}

/// Classifies why an enrichment attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  Truncation,
  Parse,
  Validation,
  NoEvidence,
  Runtime,
}

impl FailureKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      FailureKind::Truncation => "truncation",
      FailureKind::Parse => "parse",
      FailureKind::Validation => "validation",
      FailureKind::NoEvidence => "no_evidence",
      FailureKind::Runtime => "runtime",
    }
  }
}

/// Metrics computed for a span, used to select a starting tier.
#[derive(Debug, Clone, Default)]
pub struct SpanMetrics {
  pub tokens_in: u64,
  pub tokens_out: u64,
  pub node_count: u64,
  pub schema_depth: u64,
  pub array_elements: u64,
  pub csv_columns: u64,
  pub line_count: u64,
  pub nesting_depth: u64,
  pub rag_k: Option<u32>,
  pub rag_avg_score: Option<f64>,
}

/// Tunable thresholds for routing decisions, overridable via `ROUTER_*` env
/// vars. Read once at startup and passed by reference, never re-read.
#[derive(Debug, Clone)]
pub struct RouterConfig {
  pub context_limit: u64,
  pub headroom: u64,
  pub preflight_limit: u64,
  pub node_limit: u64,
  pub depth_limit: u64,
  pub array_limit: u64,
  pub csv_limit: u64,
  pub nesting_limit: u64,
  pub line_threshold_low: u64,
  pub line_threshold_high: u64,
  pub default_tier_override: Option<Tier>,
  /// When true (the default), a tier already visited in this task's
  /// history is never retried; `choose_next_tier_on_failure`'s suggestion
  /// is discarded and the attempt gives up instead. Disabling it allows a
  /// tier to be revisited.
  pub promote_once: bool,
}

impl Default for RouterConfig {
  fn default() -> Self {
    Self {
      context_limit: 32_000,
      headroom: 4_000,
      preflight_limit: 28_000,
      node_limit: 800,
      depth_limit: 6,
      array_limit: 5_000,
      csv_limit: 60,
      nesting_limit: 3,
      line_threshold_low: 60,
      line_threshold_high: 100,
      default_tier_override: None,
      promote_once: true,
    }
  }
}

impl RouterConfig {
  /// Builds config from defaults, overridden by `ROUTER_*` environment
  /// variables when present and parseable.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    config.context_limit = read_u64_env("ROUTER_CONTEXT_LIMIT", config.context_limit);
    config.headroom = read_u64_env("ROUTER_MAX_TOKENS_HEADROOM", config.headroom);
    config.preflight_limit = read_u64_env("ROUTER_PRE_FLIGHT_LIMIT", config.preflight_limit);
    config.node_limit = read_u64_env("ROUTER_NODE_LIMIT", config.node_limit);
    config.depth_limit = read_u64_env("ROUTER_DEPTH_LIMIT", config.depth_limit);
    config.array_limit = read_u64_env("ROUTER_ARRAY_LIMIT", config.array_limit);
    config.csv_limit = read_u64_env("ROUTER_CSV_LIMIT", config.csv_limit);
    config.nesting_limit = read_u64_env("ROUTER_NESTING_LIMIT", config.nesting_limit);

    if let Ok(raw) = std::env::var("ROUTER_LINE_THRESHOLDS")
      && let Some((low_raw, high_raw)) = raw.split_once(',')
      && let (Ok(mut low), Ok(mut high)) = (low_raw.trim().parse::<u64>(), high_raw.trim().parse::<u64>())
    {
      if low == 0 || high == 0 {
        low = 60;
        high = 100;
      }
      if low > high {
        std::mem::swap(&mut low, &mut high);
      }
      config.line_threshold_low = low;
      config.line_threshold_high = high;
    }

    if let Ok(raw) = std::env::var("ROUTER_DEFAULT_TIER") {
      config.default_tier_override = raw.to_lowercase().parse().ok();
    }

    if let Ok(raw) = std::env::var("ROUTER_PROMOTE_ONCE") {
      config.promote_once = parse_bool_env(&raw, config.promote_once);
    }

    config
  }

  /// `min(preflight_limit, context_limit - headroom)`.
  pub fn effective_token_limit(&self) -> u64 {
    let context_cap = self.context_limit.saturating_sub(self.headroom).max(1);
    self.preflight_limit.min(context_cap)
  }
}

fn read_u64_env(name: &str, current: u64) -> u64 {
  std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(current)
}

fn parse_bool_env(raw: &str, current: bool) -> bool {
  match raw.trim().to_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => true,
    "0" | "false" | "no" | "off" => false,
    _ => current,
  }
}

/// ~4 characters per token, minimum 1 for non-empty text.
pub fn estimate_tokens_from_text(text: &str) -> u64 {
  if text.is_empty() {
    return 0;
  }
  ((text.len() as f64 / 4.0).ceil() as u64).max(1)
}

/// Parses `text` as JSON and returns `(node_count, max_depth)`; falls back
/// to a brace/bracket counting heuristic if it doesn't parse.
pub fn estimate_json_nodes_and_depth(text: &str) -> (u64, u64) {
  if text.is_empty() {
    return (0, 0);
  }
  match serde_json::from_str::<Value>(text) {
    Ok(value) => walk_json(&value, 1),
    Err(_) => {
      let mut node_count = 0u64;
      let mut depth = 0u64;
      let mut current = 0u64;
      for ch in text.chars() {
        match ch {
          '{' | '[' => {
            current += 1;
            depth = depth.max(current);
            node_count += 1;
          }
          '}' | ']' if current > 0 => current -= 1,
          _ => {}
        }
      }
      (node_count, depth)
    }
  }
}

fn walk_json(value: &Value, depth: u64) -> (u64, u64) {
  match value {
    Value::Object(map) => {
      let mut count = 1;
      let mut max_depth = depth;
      for v in map.values() {
        let (child_count, child_depth) = walk_json(v, depth + 1);
        count += child_count;
        max_depth = max_depth.max(child_depth);
      }
      (count, max_depth)
    }
    Value::Array(items) => {
      let mut count = 1;
      let mut max_depth = depth;
      for v in items {
        let (child_count, child_depth) = walk_json(v, depth + 1);
        count += child_count;
        max_depth = max_depth.max(child_depth);
      }
      (count, max_depth)
    }
    _ => (1, depth),
  }
}

/// Generic nesting depth via brace/bracket/paren stack matching.
pub fn estimate_nesting_depth(snippet: &str) -> u64 {
  let mut stack: Vec<char> = Vec::new();
  let mut max_depth = 0u64;
  for ch in snippet.chars() {
    match ch {
      '{' | '[' | '(' => {
        stack.push(ch);
        max_depth = max_depth.max(stack.len() as u64);
      }
      '}' | ']' | ')' => {
        let expected = match ch {
          '}' => '{',
          ']' => '[',
          ')' => '(',
          _ => unreachable!(),
        };
        while stack.last().is_some_and(|c| *c != expected) {
          stack.pop();
        }
        stack.pop();
      }
      _ => {}
    }
  }
  max_depth
}

/// `(estimated_fields * 6) + tokens(code_snippet)/2`, floored at 1200.
pub fn expected_output_tokens(estimated_fields: u64, code_snippet: &str) -> u64 {
  let approx_values = estimate_tokens_from_text(code_snippet) / 2;
  let estimate = estimated_fields * 6 + approx_values;
  estimate.max(1200)
}

/// Heuristically detects a truncated model response.
pub fn detect_truncation(output_text: &str, max_tokens_used: Option<i64>, finish_reason: Option<&str>) -> bool {
  if let Some(reason) = finish_reason
    && matches!(reason.to_lowercase().as_str(), "length" | "max_tokens" | "token_limit")
  {
    return true;
  }
  if output_text.is_empty() {
    return false;
  }
  let opens = output_text.matches('{').count();
  let closes = output_text.matches('}').count();
  if closes < opens && opens - closes > 1 {
    return true;
  }
  let trimmed = output_text.trim_end();
  if let Some(last) = trimmed.chars().last()
    && last != '}'
    && last != ']'
    && last != '"'
  {
    return true;
  }
  if let Some(used) = max_tokens_used
    && used <= 0
  {
    return true;
  }
  false
}

/// Picks the tier to start an enrichment attempt at.
pub fn choose_start_tier(metrics: &SpanMetrics, config: &RouterConfig) -> Tier {
  if let Some(tier) = config.default_tier_override {
    return tier;
  }

  let tokens_total = metrics.tokens_in + metrics.tokens_out;
  if tokens_total > config.effective_token_limit() {
    return Tier::Nano;
  }
  if metrics.node_count > config.node_limit || metrics.schema_depth > config.depth_limit {
    return Tier::Nano;
  }
  if metrics.array_elements > config.array_limit || metrics.csv_columns > config.csv_limit {
    return Tier::Nano;
  }

  let mut tier = if metrics.line_count > config.line_threshold_high {
    Tier::Fourteen
  } else if metrics.line_count > config.line_threshold_low || metrics.nesting_depth > config.nesting_limit {
    Tier::Fourteen
  } else {
    Tier::Seven
  };

  let weak_retrieval =
    metrics.rag_k == Some(0) || metrics.rag_avg_score.is_some_and(|avg| avg < 0.25);
  if weak_retrieval && tier == Tier::Seven {
    tier = Tier::Fourteen;
  }

  tier
}

/// Decides the next tier to retry at after `current_tier` fails with
/// `failure`, or `None` to give up. `nano` never promotes further.
pub fn choose_next_tier_on_failure(failure: FailureKind, current_tier: Tier) -> Option<Tier> {
  if current_tier == Tier::Nano {
    return None;
  }
  if failure == FailureKind::Truncation {
    return Some(Tier::Nano);
  }
  match current_tier {
    Tier::Seven => {
      if matches!(failure, FailureKind::Parse | FailureKind::Validation | FailureKind::NoEvidence) {
        Some(Tier::Fourteen)
      } else {
        Some(Tier::Nano)
      }
    }
    Tier::Fourteen => Some(Tier::Nano),
    Tier::Nano => None,
  }
}

/// Truncates `usage_snippet` to at most `max_lines` lines, in place.
pub fn clamp_usage_snippet(usage_snippet: &mut String, max_lines: usize) {
  let lines: Vec<&str> = usage_snippet.lines().collect();
  if lines.len() <= max_lines {
    return;
  }
  *usage_snippet = lines[..max_lines].join("\n");
}
