//! End-to-end tests: a repo with real source files goes through a full
//! registry -> scheduler -> worker pool -> job runner -> index/enrichment/
//! embedding cycle, using a fake completion client and the in-memory hash
//! embedding backend so no network access is required.

use async_trait::async_trait;
use llmc_core::{DaemonConfig, Job, RepoDescriptor};
use llmc_daemon::{InProcessRunner, JobRunner, Scheduler, TickOutcome, WorkerPool};
use llmc_embedding::{EmbeddingBackend, HashBackend, wrap_resilient_arc};
use llmc_engine::{EmbeddingEngine, EnrichmentEngine, LineHeuristicExtractor, SpanExtractor, TierModels};
use llmc_llm::{CompletionClient, CompletionRequest, CompletionResponse};
use llmc_router::RouterConfig;
use llmc_store::{ControlSurface, Registry, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Always returns a well-formed, valid enrichment payload, regardless of
/// model or tier. Good enough to drive the enrichment loop to success on
/// the first attempt.
struct StubCompletionClient;

#[async_trait]
impl CompletionClient for StubCompletionClient {
  fn name(&self) -> &str {
    "stub"
  }

  async fn complete(&self, request: CompletionRequest) -> llmc_llm::Result<CompletionResponse> {
    let _ = request;
    let body = serde_json::json!({
        "summary_120w": "reads a value and returns it",
        "tags": ["accessor"],
        "evidence": ["line 1"],
        "inputs": [],
        "outputs": ["value"],
        "side_effects": [],
        "pitfalls": [],
        "usage_snippet": "",
    });
    Ok(CompletionResponse {
      text: body.to_string(),
      finish_reason: Some("stop".to_string()),
      tokens_used: Some(42),
    })
  }
}

fn make_config(dir: &TempDir) -> DaemonConfig {
  DaemonConfig {
    tick_interval_seconds: 1,
    max_concurrent_jobs: 2,
    registry_path: dir.path().join("repos.yml"),
    state_store_path: dir.path().join("state"),
    control_dir: dir.path().join("control"),
    log_path: dir.path().join("logs"),
    ..Default::default()
  }
}

fn write_sample_repo(repo_dir: &std::path::Path) {
  std::fs::create_dir_all(repo_dir).unwrap();
  std::fs::write(
    repo_dir.join("lib.rs"),
    "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n\nfn sub(a: i32, b: i32) -> i32 {\n    a - b\n}\n",
  )
  .unwrap();
}

fn runner() -> Arc<dyn JobRunner> {
  let extractor: Arc<dyn SpanExtractor> = Arc::new(LineHeuristicExtractor);
  let stub: Arc<dyn CompletionClient> = Arc::new(StubCompletionClient);
  let enrichment_engine = Arc::new(EnrichmentEngine::new(
    RouterConfig::default(),
    TierModels::default(),
    stub.clone(),
    stub,
  ));
  let backend: Arc<dyn EmbeddingBackend> = wrap_resilient_arc(HashBackend::new(64));
  let embedding_engine = Arc::new(EmbeddingEngine::new(backend, "semantic"));
  Arc::new(InProcessRunner::new(extractor, enrichment_engine, vec![embedding_engine]))
}

#[tokio::test]
async fn full_tick_indexes_enriches_and_embeds_a_repo() {
  let dir = TempDir::new().unwrap();
  let repo_dir = dir.path().join("repo");
  let workspace_dir = dir.path().join("workspace");
  write_sample_repo(&repo_dir);

  let config = Arc::new(make_config(&dir));
  let registry = Registry::new(config.registry_path.clone());
  let repo = RepoDescriptor::new(repo_dir.clone(), workspace_dir.clone());
  let mut repos = HashMap::new();
  repos.insert(repo.repo_id.clone(), repo.clone());
  registry.save(&repos).unwrap();

  let state_store = Arc::new(StateStore::new(config.state_store_path.clone()));
  let control = ControlSurface::new(config.control_dir.clone());
  let worker_pool = Arc::new(WorkerPool::new(runner(), state_store.clone(), config.clone()));
  let scheduler = Scheduler::new(registry, state_store.clone(), control, worker_pool.clone(), config.clone());

  match scheduler.run_once() {
    TickOutcome::Submitted(mut join_set) => {
      while join_set.join_next().await.is_some() {}
    }
    TickOutcome::Shutdown => panic!("unexpected shutdown on first tick"),
  }

  let state = state_store.get(&repo.repo_id).unwrap().expect("state recorded after tick");
  assert_eq!(state.consecutive_failures, 0, "job should have succeeded: {:?}", state.last_error_reason);
  assert_eq!(state.status, Some(llmc_core::RunStatus::Success));
  assert!(state.last_run_finished_at.is_some());

  let db_path = workspace_dir.join("indexes").join("rag.db");
  assert!(db_path.exists(), "index db should have been created");

  let store = llmc_store::IndexStore::open(&db_path).unwrap();
  let files = store.list_file_paths().unwrap();
  assert_eq!(files, vec!["lib.rs".to_string()]);

  // A second tick immediately after should find nothing eligible: the repo
  // isn't running and its next_eligible_at is in the future.
  match scheduler.run_once() {
    TickOutcome::Submitted(mut join_set) => {
      assert!(join_set.join_next().await.is_none(), "no jobs should have been submitted");
    }
    TickOutcome::Shutdown => panic!("unexpected shutdown on second tick"),
  }
}

#[tokio::test]
async fn forced_refresh_runs_even_when_not_yet_due() {
  let dir = TempDir::new().unwrap();
  let repo_dir = dir.path().join("repo");
  let workspace_dir = dir.path().join("workspace");
  write_sample_repo(&repo_dir);

  let config = Arc::new(make_config(&dir));
  let registry = Registry::new(config.registry_path.clone());
  let repo = RepoDescriptor::new(repo_dir.clone(), workspace_dir.clone());
  let mut repos = HashMap::new();
  repos.insert(repo.repo_id.clone(), repo.clone());
  registry.save(&repos).unwrap();

  let state_store = Arc::new(StateStore::new(config.state_store_path.clone()));
  state_store
    .update(&repo.repo_id, |mut s| {
      s.mark_success(chrono::Utc::now(), chrono::Duration::seconds(3600));
      s
    })
    .unwrap();

  let control = ControlSurface::new(config.control_dir.clone());
  control.write_flag("refresh_all").unwrap();

  let worker_pool = Arc::new(WorkerPool::new(runner(), state_store.clone(), config.clone()));
  let scheduler = Scheduler::new(registry, state_store.clone(), control, worker_pool.clone(), config.clone());

  match scheduler.run_once() {
    TickOutcome::Submitted(mut join_set) => {
      let ran = join_set.join_next().await;
      assert!(ran.is_some(), "forced refresh should have submitted a job");
    }
    TickOutcome::Shutdown => panic!("refresh_all should not trigger shutdown"),
  }
}

#[tokio::test]
async fn shutdown_flag_short_circuits_the_tick() {
  let dir = TempDir::new().unwrap();
  let config = Arc::new(make_config(&dir));
  let registry = Registry::new(config.registry_path.clone());
  let state_store = Arc::new(StateStore::new(config.state_store_path.clone()));
  let control = ControlSurface::new(config.control_dir.clone());
  control.write_flag("shutdown").unwrap();

  let worker_pool = Arc::new(WorkerPool::new(runner(), state_store.clone(), config.clone()));
  let scheduler = Scheduler::new(registry, state_store, control, worker_pool, config);

  assert!(matches!(scheduler.run_once(), TickOutcome::Shutdown));
}

#[tokio::test]
async fn a_persistently_failing_repo_eventually_stops_being_scheduled() {
  struct AlwaysFailRunner;
  #[async_trait]
  impl JobRunner for AlwaysFailRunner {
    async fn run(&self, job: &Job) -> llmc_core::JobResult {
      llmc_core::JobResult {
        repo_id: job.repo.repo_id.clone(),
        success: false,
        exit_code: -1,
        error_reason: Some("boom".to_string()),
        summary: None,
        stdout_tail: String::new(),
        stderr_tail: "boom".to_string(),
      }
    }
  }

  let dir = TempDir::new().unwrap();
  let mut config = make_config(&dir);
  config.max_consecutive_failures = 2;
  config.base_backoff_seconds = 0;
  let config = Arc::new(config);

  let repo_dir = dir.path().join("repo");
  let workspace_dir = dir.path().join("workspace");
  write_sample_repo(&repo_dir);

  let registry = Registry::new(config.registry_path.clone());
  let repo = RepoDescriptor::new(repo_dir, workspace_dir);
  let mut repos = HashMap::new();
  repos.insert(repo.repo_id.clone(), repo.clone());
  registry.save(&repos).unwrap();

  let state_store = Arc::new(StateStore::new(config.state_store_path.clone()));
  let control = ControlSurface::new(config.control_dir.clone());
  let worker_pool = Arc::new(WorkerPool::new(Arc::new(AlwaysFailRunner), state_store.clone(), config.clone()));
  let scheduler = Scheduler::new(registry, state_store.clone(), control, worker_pool, config);

  for _ in 0..2 {
    match scheduler.run_once() {
      TickOutcome::Submitted(mut join_set) => {
        while join_set.join_next().await.is_some() {}
      }
      TickOutcome::Shutdown => panic!("unexpected shutdown"),
    }
  }

  let state = state_store.get(&repo.repo_id).unwrap().unwrap();
  assert_eq!(state.consecutive_failures, 2);

  match scheduler.run_once() {
    TickOutcome::Submitted(mut join_set) => {
      assert!(
        join_set.join_next().await.is_none(),
        "repo should be skipped once max_consecutive_failures is reached"
      );
    }
    TickOutcome::Shutdown => panic!("unexpected shutdown"),
  }
}
