//! Bounded concurrent job execution with a running-repo set, grounded on
//! the original worker pool's submit-then-check-then-spawn discipline: a
//! repo already mid-refresh is skipped rather than queued twice.

use crate::job_runner::JobRunner;
use llmc_core::{DaemonConfig, Job, JobResult, RepoId};
use llmc_store::StateStore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct WorkerPool {
  runner: Arc<dyn JobRunner>,
  state_store: Arc<StateStore>,
  config: Arc<DaemonConfig>,
  semaphore: Arc<Semaphore>,
  running: Arc<Mutex<HashSet<RepoId>>>,
}

impl WorkerPool {
  pub fn new(runner: Arc<dyn JobRunner>, state_store: Arc<StateStore>, config: Arc<DaemonConfig>) -> Self {
    let capacity = config.max_concurrent_jobs.max(1);
    Self {
      runner,
      state_store,
      config,
      semaphore: Arc::new(Semaphore::new(capacity)),
      running: Arc::new(Mutex::new(HashSet::new())),
    }
  }

  pub fn running_repo_ids(&self) -> HashSet<RepoId> {
    self.running.lock().unwrap().clone()
  }

  /// Submits `jobs` to a fresh `JoinSet`, skipping any repo already running
  /// (a race against a prior tick's still-in-flight job). The running-set
  /// mutex is held only across the set mutation, never across an `.await`.
  pub fn submit_jobs(&self, jobs: Vec<Job>) -> JoinSet<()> {
    let mut join_set = JoinSet::new();
    for job in jobs {
      let repo_id = job.repo.repo_id.clone();
      {
        let mut running = self.running.lock().unwrap();
        if running.contains(&repo_id) {
          tracing::debug!(repo_id = %repo_id, "skipping job, repo already running");
          let now = chrono::Utc::now();
          if let Err(err) = self.state_store.update(&repo_id, move |mut state| {
            state.mark_skipped(now);
            state
          }) {
            tracing::warn!(repo_id = %repo_id, error = %err, "failed to record skipped job");
          }
          continue;
        }
        running.insert(repo_id.clone());
      }

      let runner = self.runner.clone();
      let state_store = self.state_store.clone();
      let config = self.config.clone();
      let semaphore = self.semaphore.clone();
      let running = self.running.clone();

      join_set.spawn(async move {
        let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
        run_one_job(runner.as_ref(), &state_store, &config, &job).await;
        running.lock().unwrap().remove(&repo_id);
      });
    }
    join_set
  }
}

/// Marks the repo running, invokes the runner, then folds the result back
/// into the state store: success resets the failure count and schedules the
/// next eligible run; failure applies the exponential backoff formula
/// `min(max_backoff, base_backoff * 2^(consecutive_failures-1))`.
async fn run_one_job(runner: &dyn JobRunner, state_store: &StateStore, config: &DaemonConfig, job: &Job) {
  let repo_id = job.repo.repo_id.clone();
  let started_at = chrono::Utc::now();
  if let Err(err) = state_store.update(&repo_id, |mut state| {
    state.mark_running(started_at);
    state
  }) {
    tracing::warn!(repo_id = %repo_id, error = %err, "failed to record job start");
  }

  let result: JobResult = runner.run(job).await;
  let finished_at = chrono::Utc::now();

  if result.success {
    tracing::info!(repo_id = %repo_id, job_id = %job.job_id, "job succeeded");
  } else {
    tracing::warn!(
      repo_id = %repo_id,
      job_id = %job.job_id,
      reason = result.error_reason.as_deref().unwrap_or("unknown"),
      "job failed"
    );
  }

  let effective_interval = config.effective_refresh_interval(job.repo.min_refresh_interval_secs);
  let base_backoff = config.base_backoff_seconds;
  let max_backoff = config.max_backoff_seconds;
  let error_reason = result.error_reason.clone().unwrap_or_else(|| "unknown error".to_string());
  let summary = result.summary.clone();

  let update = state_store.update(&repo_id, move |mut state| {
    if result.success {
      state.mark_success(finished_at, chrono::Duration::seconds(effective_interval as i64));
    } else {
      let failures_after = state.consecutive_failures + 1;
      let backoff_secs =
        (base_backoff as f64 * 2f64.powi((failures_after - 1) as i32)).min(max_backoff as f64) as u64;
      state.mark_failure(finished_at, error_reason.clone(), chrono::Duration::seconds(backoff_secs as i64));
    }
    state.last_job_summary = summary.clone();
    state
  });
  if let Err(err) = update {
    tracing::warn!(repo_id = %repo_id, error = %err, "failed to record job result");
  }
}
