//! Daemon configuration with environment-variable overrides.
//!
//! Config priority: `LLMC_RAG_DAEMON_CONFIG` path env var, then
//! `~/.llmc/daemon.toml`, then built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_tick_interval_seconds() -> u64 {
  120
}
fn default_max_concurrent_jobs() -> usize {
  2
}
fn default_max_consecutive_failures() -> u32 {
  5
}
fn default_base_backoff_seconds() -> u64 {
  60
}
fn default_max_backoff_seconds() -> u64 {
  3600
}
fn default_job_runner_cmd() -> String {
  "llmc-rag-job".to_string()
}
fn default_log_level() -> String {
  "info".to_string()
}

fn home_subpath(sub: &str) -> PathBuf {
  dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".llmc").join(sub)
}

fn default_registry_path() -> PathBuf {
  dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".llmc").join("repos.yml")
}
fn default_state_store_path() -> PathBuf {
  home_subpath("rag-state")
}
fn default_log_path() -> PathBuf {
  home_subpath("logs/rag-daemon")
}
fn default_control_dir() -> PathBuf {
  home_subpath("rag-control")
}

/// Output format for the structured logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Plain,
  Json,
}

/// Top-level daemon configuration, loaded once at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  #[serde(default = "default_tick_interval_seconds")]
  pub tick_interval_seconds: u64,

  #[serde(default = "default_max_concurrent_jobs")]
  pub max_concurrent_jobs: usize,

  #[serde(default = "default_max_consecutive_failures")]
  pub max_consecutive_failures: u32,

  #[serde(default = "default_base_backoff_seconds")]
  pub base_backoff_seconds: u64,

  #[serde(default = "default_max_backoff_seconds")]
  pub max_backoff_seconds: u64,

  #[serde(default = "default_registry_path")]
  pub registry_path: PathBuf,

  #[serde(default = "default_state_store_path")]
  pub state_store_path: PathBuf,

  #[serde(default = "default_log_path")]
  pub log_path: PathBuf,

  #[serde(default = "default_control_dir")]
  pub control_dir: PathBuf,

  #[serde(default = "default_job_runner_cmd")]
  pub job_runner_cmd: String,

  #[serde(default = "default_log_level")]
  pub log_level: String,

  #[serde(default)]
  pub log_format: LogFormat,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      tick_interval_seconds: default_tick_interval_seconds(),
      max_concurrent_jobs: default_max_concurrent_jobs(),
      max_consecutive_failures: default_max_consecutive_failures(),
      base_backoff_seconds: default_base_backoff_seconds(),
      max_backoff_seconds: default_max_backoff_seconds(),
      registry_path: default_registry_path(),
      state_store_path: default_state_store_path(),
      log_path: default_log_path(),
      control_dir: default_control_dir(),
      job_runner_cmd: default_job_runner_cmd(),
      log_level: default_log_level(),
      log_format: LogFormat::default(),
    }
  }
}

impl DaemonConfig {
  /// Load from the path named by `LLMC_RAG_DAEMON_CONFIG`, falling back to
  /// `~/.llmc/daemon.toml`, falling back to defaults. Ensures the
  /// directories it names exist.
  pub fn load() -> Self {
    let path = std::env::var("LLMC_RAG_DAEMON_CONFIG")
      .map(PathBuf::from)
      .unwrap_or_else(|_| home_subpath("daemon.toml"));

    let config = if path.exists()
      && let Ok(content) = std::fs::read_to_string(&path)
      && let Ok(config) = toml::from_str(&content)
    {
      config
    } else {
      Self::default()
    };

    config.ensure_directories();
    config
  }

  fn ensure_directories(&self) {
    for dir in [&self.state_store_path, &self.log_path, &self.control_dir] {
      let _ = std::fs::create_dir_all(dir);
    }
    if let Some(parent) = self.registry_path.parent() {
      let _ = std::fs::create_dir_all(parent);
    }
  }

  /// `max(min_refresh_interval, tick_interval)`, in seconds.
  pub fn effective_refresh_interval(&self, min_refresh_interval_secs: Option<u64>) -> u64 {
    min_refresh_interval_secs.unwrap_or(0).max(self.tick_interval_seconds)
  }

  pub fn generate_template() -> String {
    format!(
      r#"# LLMC RAG daemon configuration
# Place at ~/.llmc/daemon.toml, or point LLMC_RAG_DAEMON_CONFIG at another path.

# Seconds between scheduler ticks.
tick_interval_seconds = {tick}

# Maximum number of refresh jobs running at once.
max_concurrent_jobs = {jobs}

# Consecutive failures after which a repo is skipped until force-refreshed.
max_consecutive_failures = {failures}

# Backoff formula: min(max_backoff_seconds, base_backoff_seconds * 2^(n-1))
base_backoff_seconds = {base_backoff}
max_backoff_seconds = {max_backoff}

registry_path = "{registry}"
state_store_path = "{state}"
log_path = "{log}"
control_dir = "{control}"

job_runner_cmd = "{runner}"
log_level = "{level}"
# log_format = "plain" | "json"
"#,
      tick = default_tick_interval_seconds(),
      jobs = default_max_concurrent_jobs(),
      failures = default_max_consecutive_failures(),
      base_backoff = default_base_backoff_seconds(),
      max_backoff = default_max_backoff_seconds(),
      registry = default_registry_path().display(),
      state = default_state_store_path().display(),
      log = default_log_path().display(),
      control = default_control_dir().display(),
      runner = default_job_runner_cmd(),
      level = default_log_level(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_spec() {
    let config = DaemonConfig::default();
    assert_eq!(config.tick_interval_seconds, 120);
    assert_eq!(config.max_concurrent_jobs, 2);
    assert_eq!(config.max_consecutive_failures, 5);
    assert_eq!(config.base_backoff_seconds, 60);
    assert_eq!(config.max_backoff_seconds, 3600);
    assert_eq!(config.job_runner_cmd, "llmc-rag-job");
  }

  #[test]
  fn effective_refresh_interval_takes_the_larger() {
    let config = DaemonConfig {
      tick_interval_seconds: 120,
      ..Default::default()
    };
    assert_eq!(config.effective_refresh_interval(Some(30)), 120);
    assert_eq!(config.effective_refresh_interval(Some(600)), 600);
    assert_eq!(config.effective_refresh_interval(None), 120);
  }

  #[test]
  fn toml_roundtrip() {
    let config = DaemonConfig {
      tick_interval_seconds: 30,
      max_concurrent_jobs: 4,
      ..Default::default()
    };
    let toml_str = toml::to_string_pretty(&config).unwrap();
    let parsed: DaemonConfig = toml::from_str(&toml_str).unwrap();
    assert_eq!(parsed.tick_interval_seconds, 30);
    assert_eq!(parsed.max_concurrent_jobs, 4);
  }

  #[test]
  fn generate_template_contains_all_keys() {
    let template = DaemonConfig::generate_template();
    assert!(template.contains("tick_interval_seconds"));
    assert!(template.contains("max_concurrent_jobs"));
    assert!(template.contains("job_runner_cmd"));
  }

  #[test]
  fn partial_toml_falls_back_to_defaults() {
    let parsed: DaemonConfig = toml::from_str("tick_interval_seconds = 45\n").unwrap();
    assert_eq!(parsed.tick_interval_seconds, 45);
    assert_eq!(parsed.max_concurrent_jobs, 2);
  }
}
