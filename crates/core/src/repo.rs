//! Repository identity, registration, and refresh-cycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Stable opaque identifier for a registered repository, derived from the
/// canonicalized repo path so it survives daemon restarts without a separate
/// id allocator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoId(String);

impl RepoId {
  pub fn from_path(path: &Path) -> Self {
    let canon = path.to_string_lossy();
    let mut hasher = Sha256::new();
    hasher.update(canon.as_bytes());
    let digest = hasher.finalize();
    Self(hex::encode(&digest[..16]))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for RepoId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<String> for RepoId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

/// Paths under `/etc`, `/proc`, `/sys`, `/dev`, or `/root` are never accepted
/// as repo roots.
const SENSITIVE_PREFIXES: &[&str] = &["/etc", "/proc", "/sys", "/dev", "/root"];

/// A repository entry loaded from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoDescriptor {
  pub repo_id: RepoId,
  pub repo_path: PathBuf,
  pub workspace_path: PathBuf,
  #[serde(default)]
  pub profile: Option<String>,
  #[serde(default)]
  pub min_refresh_interval_secs: Option<u64>,
  #[serde(default = "default_enabled")]
  pub enabled: bool,
}

fn default_enabled() -> bool {
  true
}

impl RepoDescriptor {
  pub fn new(repo_path: PathBuf, workspace_path: PathBuf) -> Self {
    let repo_id = RepoId::from_path(&repo_path);
    Self {
      repo_id,
      repo_path,
      workspace_path,
      profile: None,
      min_refresh_interval_secs: None,
      enabled: true,
    }
  }

  /// True if `repo_path` is safe to register: absolute, and not rooted under
  /// a sensitive system directory.
  pub fn is_safe_path(path: &Path) -> bool {
    if !path.is_absolute() {
      return false;
    }
    let s = path.to_string_lossy();
    !SENSITIVE_PREFIXES
      .iter()
      .any(|prefix| s == *prefix || s.starts_with(&format!("{prefix}/")))
  }
}

/// Refresh outcome recorded on the most recent completed (or in-flight) job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Running,
  Success,
  Error,
  Skipped,
}

/// Per-repo durable refresh-cycle state, one JSON file per repo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoState {
  pub repo_id: RepoId,
  #[serde(default)]
  pub status: Option<RunStatus>,
  #[serde(default)]
  pub last_run_started_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub last_run_finished_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub consecutive_failures: u32,
  #[serde(default)]
  pub last_error_reason: Option<String>,
  #[serde(default)]
  pub next_eligible_at: Option<DateTime<Utc>>,
  /// Free-form summary of the most recently completed (or skipped) job.
  #[serde(default)]
  pub last_job_summary: Option<serde_json::Value>,
}

impl RepoState {
  pub fn new(repo_id: RepoId) -> Self {
    Self {
      repo_id,
      status: None,
      last_run_started_at: None,
      last_run_finished_at: None,
      consecutive_failures: 0,
      last_error_reason: None,
      next_eligible_at: None,
      last_job_summary: None,
    }
  }

  /// Has this repo never completed (or started) a refresh cycle?
  pub fn never_run(&self) -> bool {
    self.status.is_none() && self.last_run_started_at.is_none()
  }

  pub fn mark_running(&mut self, now: DateTime<Utc>) {
    self.status = Some(RunStatus::Running);
    self.last_run_started_at = Some(now);
  }

  pub fn mark_success(&mut self, now: DateTime<Utc>, eligible_interval: chrono::Duration) {
    self.status = Some(RunStatus::Success);
    self.last_run_finished_at = Some(now);
    self.consecutive_failures = 0;
    self.last_error_reason = None;
    self.next_eligible_at = Some(now + eligible_interval);
  }

  pub fn mark_failure(&mut self, now: DateTime<Utc>, reason: String, backoff: chrono::Duration) {
    self.status = Some(RunStatus::Error);
    self.last_run_finished_at = Some(now);
    self.consecutive_failures += 1;
    self.last_error_reason = Some(reason);
    self.next_eligible_at = Some(now + backoff);
  }

  /// Records that a submitted job was dropped before it ran, e.g. because
  /// the repo was already owned by another in-flight job this tick.
  /// Leaves `consecutive_failures`/`next_eligible_at` untouched so the next
  /// tick's eligibility check is unaffected.
  pub fn mark_skipped(&mut self, now: DateTime<Utc>) {
    self.status = Some(RunStatus::Skipped);
    self.last_run_finished_at = Some(now);
  }
}
