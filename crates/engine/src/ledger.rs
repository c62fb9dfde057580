//! Append-only JSONL ledger of enrichment attempts, one line per attempt,
//! plus the quarantine directory for raw output on unrecoverable failures.

use chrono::Utc;
use llmc_core::LedgerRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends `record` to `<workspace>/logs/enrichment_ledger.jsonl`. Never
/// rewrites a prior line; a write failure is logged and swallowed, since the
/// ledger is observability, not a source of truth.
pub fn append(workspace: &Path, record: &LedgerRecord) {
  let path = ledger_path(workspace);
  if let Some(parent) = path.parent() {
    let _ = std::fs::create_dir_all(parent);
  }
  let line = match serde_json::to_string(record) {
    Ok(line) => line,
    Err(err) => {
      tracing::warn!(error = %err, "failed to serialize ledger record");
      return;
    }
  };
  let result = OpenOptions::new()
    .create(true)
    .append(true)
    .open(&path)
    .and_then(|mut file| writeln!(file, "{line}"));
  if let Err(err) = result {
    tracing::warn!(path = %path.display(), error = %err, "failed to append ledger record");
  }
}

pub fn ledger_path(workspace: &Path) -> PathBuf {
  workspace.join("logs").join("enrichment_ledger.jsonl")
}

/// Writes raw model output to `<workspace>/tmp/quarantine/<span_hash>.txt`
/// for a span that failed parse/truncation validation after exhausting the
/// tier router. Best-effort: a write failure is logged, not propagated.
pub fn quarantine(workspace: &Path, span_hash: &str, raw_output: &str) {
  let dir = quarantine_dir(workspace);
  if let Err(err) = std::fs::create_dir_all(&dir) {
    tracing::warn!(path = %dir.display(), error = %err, "failed to create quarantine dir");
    return;
  }
  let path = dir.join(format!("{span_hash}.txt"));
  if let Err(err) = std::fs::write(&path, raw_output) {
    tracing::warn!(path = %path.display(), error = %err, "failed to write quarantine file");
  }
}

pub fn quarantine_dir(workspace: &Path) -> PathBuf {
  workspace.join("tmp").join("quarantine")
}

pub fn now_timestamp() -> chrono::DateTime<Utc> {
  Utc::now()
}

#[cfg(test)]
mod tests {
  use super::*;
  use llmc_core::RepoId;
  use std::path::Path;

  #[test]
  fn append_creates_logs_dir_and_appends_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let record = LedgerRecord {
      span_hash: "h1".to_string(),
      repo_id: RepoId::from_path(Path::new("/tmp/repo")),
      path: "a.rs".to_string(),
      tier: "7b".to_string(),
      attempt: 1,
      outcome: "pass".to_string(),
      failure_kind: None,
      metrics: llmc_core::LedgerMetrics {
        line_count: 5,
        nesting_depth: 1,
        tokens_in: 100,
        tokens_out: 200,
      },
      wall_ms: 42,
      promo: "none".to_string(),
      timestamp: now_timestamp(),
    };
    append(dir.path(), &record);
    let contents = std::fs::read_to_string(ledger_path(dir.path())).unwrap();
    assert!(contents.contains("\"span_hash\":\"h1\""));
    assert_eq!(contents.lines().count(), 1);
  }

  #[test]
  fn quarantine_writes_raw_output_under_tmp() {
    let dir = tempfile::tempdir().unwrap();
    quarantine(dir.path(), "h1", "not json");
    let path = quarantine_dir(dir.path()).join("h1.txt");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "not json");
  }
}
