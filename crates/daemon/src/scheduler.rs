//! Tick loop: reads control flags, resolves which repos are due for a
//! refresh, and hands jobs to the worker pool.

use crate::worker_pool::WorkerPool;
use chrono::{DateTime, Utc};
use llmc_core::{ControlEvents, DaemonConfig, Job, RepoId, RepoState, make_job_id};
use llmc_store::{ControlSurface, Registry, StateStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct Scheduler {
  registry: Registry,
  state_store: Arc<StateStore>,
  control: ControlSurface,
  worker_pool: Arc<WorkerPool>,
  config: Arc<DaemonConfig>,
}

pub enum TickOutcome {
  /// A shutdown flag was observed on the control surface; the caller should
  /// stop ticking.
  Shutdown,
  /// Jobs were submitted to the worker pool (possibly zero).
  Submitted(JoinSet<()>),
}

impl Scheduler {
  pub fn new(
    registry: Registry,
    state_store: Arc<StateStore>,
    control: ControlSurface,
    worker_pool: Arc<WorkerPool>,
    config: Arc<DaemonConfig>,
  ) -> Self {
    Self {
      registry,
      state_store,
      control,
      worker_pool,
      config,
    }
  }

  /// Runs a single tick. Resolves the eligible, non-running repos that fit
  /// in the pool's remaining slots and submits them as jobs.
  pub fn run_once(&self) -> TickOutcome {
    let events = self.control.read().unwrap_or_else(|err| {
      warn!(error = %err, "failed to read control surface, treating as no events");
      ControlEvents::default()
    });
    if events.shutdown {
      info!("shutdown flag observed");
      return TickOutcome::Shutdown;
    }

    let repos = match self.registry.load() {
      Ok(repos) => repos,
      Err(err) => {
        warn!(error = %err, "failed to load registry, skipping tick");
        return TickOutcome::Submitted(JoinSet::new());
      }
    };

    let running = self.worker_pool.running_repo_ids();
    let slots = self.config.max_concurrent_jobs.saturating_sub(running.len());
    let forced: HashSet<RepoId> = events.refresh_repo_ids.into_iter().collect();
    let now = Utc::now();

    let mut jobs = Vec::new();
    for (repo_id, repo) in repos {
      if jobs.len() >= slots {
        break;
      }
      if !repo.enabled || running.contains(&repo_id) {
        continue;
      }
      let force = events.refresh_all || forced.contains(&repo_id);

      let state = match self.state_store.get(&repo_id) {
        Ok(state) => state,
        Err(err) => {
          warn!(repo_id = %repo_id, error = %err, "failed to load repo state, skipping");
          continue;
        }
      };

      if is_eligible(state.as_ref(), force, self.config.max_consecutive_failures, now) {
        jobs.push(Job {
          job_id: make_job_id(),
          repo,
          force,
        });
      }
    }

    if jobs.is_empty() {
      debug!("tick produced no eligible jobs");
    } else {
      info!(count = jobs.len(), "submitting jobs");
    }
    TickOutcome::Submitted(self.worker_pool.submit_jobs(jobs))
  }

  /// Ticks forever, sleeping `tick_interval_seconds` plus up to 50% jitter
  /// between ticks, until a shutdown flag is observed or `shutdown_rx`
  /// fires. Submitted jobs run to completion in the background; the loop
  /// does not wait on them before sleeping again.
  pub async fn run_forever(&self, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
      match self.run_once() {
        TickOutcome::Shutdown => break,
        TickOutcome::Submitted(mut join_set) => {
          tokio::spawn(async move { while join_set.join_next().await.is_some() {} });
        }
      }

      let sleep_for = next_sleep_duration(self.config.tick_interval_seconds);
      tokio::select! {
        _ = tokio::time::sleep(sleep_for) => {}
        _ = shutdown_rx.recv() => {
          info!("shutdown signal received");
          break;
        }
      }
    }
  }
}

/// `tick_interval_seconds` plus a uniform `[0, 0.5 * tick_interval_seconds)`
/// jitter, so ticks across many daemons don't all land on the same second.
fn next_sleep_duration(tick_interval_seconds: u64) -> Duration {
  let jitter = Duration::from_secs_f64(tick_interval_seconds as f64 * 0.5 * rand_f64());
  Duration::from_secs(tick_interval_seconds) + jitter
}

/// Nanosecond-fraction jitter source, no external dependency needed.
fn rand_f64() -> f64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos();
  (nanos as f64 / u32::MAX as f64).fract()
}

fn is_eligible(state: Option<&RepoState>, forced: bool, max_consecutive_failures: u32, now: DateTime<Utc>) -> bool {
  if forced {
    return true;
  }
  let Some(state) = state else {
    return true;
  };
  if state.consecutive_failures >= max_consecutive_failures {
    return false;
  }
  match state.next_eligible_at {
    None => true,
    Some(next) => now >= next,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use llmc_core::RepoId;
  use std::path::Path;

  fn repo_id() -> RepoId {
    RepoId::from_path(Path::new("/srv/repos/foo"))
  }

  #[test]
  fn never_run_is_eligible() {
    assert!(is_eligible(None, false, 5, Utc::now()));
  }

  #[test]
  fn exhausted_failures_are_ineligible_unless_forced() {
    let mut state = RepoState::new(repo_id());
    state.consecutive_failures = 5;
    assert!(!is_eligible(Some(&state), false, 5, Utc::now()));
    assert!(is_eligible(Some(&state), true, 5, Utc::now()));
  }

  #[test]
  fn future_next_eligible_at_blocks_until_due() {
    let mut state = RepoState::new(repo_id());
    let now = Utc::now();
    state.mark_success(now, chrono::Duration::seconds(120));
    assert!(!is_eligible(Some(&state), false, 5, now));
    assert!(is_eligible(Some(&state), false, 5, now + chrono::Duration::seconds(121)));
  }

  #[test]
  fn forced_refresh_bypasses_schedule() {
    let mut state = RepoState::new(repo_id());
    let now = Utc::now();
    state.mark_success(now, chrono::Duration::seconds(120));
    assert!(is_eligible(Some(&state), true, 5, now));
  }

  #[test]
  fn jitter_stays_within_expected_bounds() {
    for _ in 0..50 {
      let sleep_for = next_sleep_duration(100);
      assert!(sleep_for >= Duration::from_secs(100));
      assert!(sleep_for < Duration::from_secs(150));
    }
  }
}
