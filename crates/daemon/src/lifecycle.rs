//! Wires the registry, state store, control surface, worker pool, and
//! scheduler into a runnable process. Shutdown is a broadcast channel fed by
//! ctrl-c and (on unix) SIGTERM, mirroring the teacher's lifecycle module.

use crate::job_runner::{InProcessRunner, JobRunner};
use crate::scheduler::{Scheduler, TickOutcome};
use crate::worker_pool::WorkerPool;
use llmc_core::DaemonConfig;
use llmc_embedding::{EmbeddingBackend, GatewayBackend, HashBackend, OllamaBackend, wrap_resilient_arc};
use llmc_engine::{EnrichmentEngine, LineHeuristicExtractor, SpanExtractor, TierModels};
use llmc_llm::{CompletionClient, GatewayClient, LocalClient};
use llmc_router::RouterConfig;
use llmc_store::{ControlSurface, Registry, StateStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

fn env_or(key: &str, default: &str) -> String {
  std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Builds the local (Ollama-compatible) and gateway completion clients from
/// `LLMC_OLLAMA_URL` / `LLMC_GATEWAY_URL`, falling back to the well-known
/// local defaults.
fn build_completion_clients() -> (Arc<dyn CompletionClient>, Arc<dyn CompletionClient>) {
  let local_url = env_or("LLMC_OLLAMA_URL", "http://localhost:11434");
  let gateway_url = env_or("LLMC_GATEWAY_URL", "http://localhost:8089");
  (Arc::new(LocalClient::new(local_url)), Arc::new(GatewayClient::new(gateway_url)))
}

/// Builds one `EmbeddingEngine` for the route named by
/// `LLMC_EMBEDDING_ROUTE` (default `semantic`), backed by
/// `LLMC_EMBEDDING_BACKEND` (`ollama` default, `gateway`, or `hash` for
/// offline testing), each wrapped with the same retry/backoff wrapper the
/// embedding crate already provides.
fn build_embedding_engine() -> llmc_engine::EmbeddingEngine {
  let route = env_or("LLMC_EMBEDDING_ROUTE", "semantic");
  let backend: Arc<dyn EmbeddingBackend> = match env_or("LLMC_EMBEDDING_BACKEND", "ollama").as_str() {
    "gateway" => {
      let url = env_or("LLMC_GATEWAY_URL", "http://localhost:8089");
      let api_key = env_or("LLMC_GATEWAY_API_KEY", "");
      wrap_resilient_arc(GatewayBackend::new(url, api_key, "gateway-embedding", 1536))
    }
    "hash" => wrap_resilient_arc(HashBackend::new(4096)),
    _ => {
      let url = env_or("LLMC_OLLAMA_URL", "http://localhost:11434");
      wrap_resilient_arc(OllamaBackend::new().with_url(url))
    }
  };
  llmc_engine::EmbeddingEngine::new(backend, route)
}

/// Top-level daemon: owns the scheduler and worker pool built from a
/// `DaemonConfig`.
pub struct Daemon {
  config: Arc<DaemonConfig>,
  scheduler: Scheduler,
  worker_pool: Arc<WorkerPool>,
}

impl Daemon {
  pub fn new(config: DaemonConfig) -> Self {
    let config = Arc::new(config);
    let registry = Registry::new(config.registry_path.clone());
    let state_store = Arc::new(StateStore::new(config.state_store_path.clone()));
    let control = ControlSurface::new(config.control_dir.clone());

    let extractor: Arc<dyn SpanExtractor> = Arc::new(LineHeuristicExtractor);
    let (local_client, gateway_client) = build_completion_clients();
    let enrichment_engine = Arc::new(EnrichmentEngine::new(
      RouterConfig::from_env(),
      TierModels::default(),
      local_client,
      gateway_client,
    ));
    let embedding_engines = vec![Arc::new(build_embedding_engine())];
    let runner: Arc<dyn JobRunner> = Arc::new(InProcessRunner::new(extractor, enrichment_engine, embedding_engines));

    let worker_pool = Arc::new(WorkerPool::new(runner, state_store.clone(), config.clone()));
    let scheduler = Scheduler::new(registry, state_store, control, worker_pool.clone(), config.clone());

    Self { config, scheduler, worker_pool }
  }

  /// Runs a single tick and waits for every job it submitted to finish.
  /// Returns `true` if a shutdown flag was observed (nothing was run).
  pub async fn run_once(&self) -> bool {
    match self.scheduler.run_once() {
      TickOutcome::Shutdown => true,
      TickOutcome::Submitted(mut join_set) => {
        while join_set.join_next().await.is_some() {}
        false
      }
    }
  }

  /// Runs the tick loop until a shutdown flag is observed on the control
  /// surface, or the process receives ctrl-c / SIGTERM.
  pub async fn run(&self) -> Result<(), LifecycleError> {
    info!(
      tick_interval_seconds = self.config.tick_interval_seconds,
      max_concurrent_jobs = self.config.max_concurrent_jobs,
      "starting llmc-rag-daemon"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
      if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        return;
      }
      info!("received ctrl-c, shutting down");
      let _ = ctrl_c_tx.send(());
    });

    #[cfg(unix)]
    {
      let sigterm_tx = shutdown_tx.clone();
      tokio::spawn(async move {
        let Ok(mut sigterm) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
          warn!("failed to install SIGTERM handler");
          return;
        };
        sigterm.recv().await;
        info!("received SIGTERM, shutting down");
        let _ = sigterm_tx.send(());
      });
    }

    self.scheduler.run_forever(shutdown_rx).await;
    info!("daemon shutdown complete");
    Ok(())
  }

  pub fn running_repo_ids(&self) -> std::collections::HashSet<llmc_core::RepoId> {
    self.worker_pool.running_repo_ids()
  }
}
