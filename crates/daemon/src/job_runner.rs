//! Runs one refresh job against a single repo: incremental index, an
//! enrichment pass, and an embedding pass per configured route. The
//! in-process runner is the default; the subprocess runner matches the
//! external-binary deployment form (`<runner> --repo <p> --workspace <w>
//! [--profile <p>]`, exit code 0 = success) for callers that want the job
//! isolated in its own process.

use async_trait::async_trait;
use llmc_core::{Job, JobResult, RepoDescriptor};
use llmc_engine::{plan_enrichment, reindex_repo, EmbeddingEngine, EnrichmentEngine, SpanExtractor};
use llmc_store::IndexStore;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

const TAIL_MAX_CHARS: usize = 2000;

#[async_trait]
pub trait JobRunner: Send + Sync {
  async fn run(&self, job: &Job) -> JobResult;
}

fn tail(text: &str, max_chars: usize) -> String {
  let len = text.chars().count();
  if len <= max_chars {
    text.to_string()
  } else {
    text.chars().skip(len - max_chars).collect()
  }
}

fn index_db_path(repo: &RepoDescriptor) -> PathBuf {
  repo.workspace_path.join("indexes").join("rag.db")
}

/// Runs the index/enrichment/embedding passes directly in this process,
/// against the calling tokio runtime. Blocking store I/O runs in
/// `spawn_blocking`; the completion/embedding requests inside it are driven
/// with `Handle::block_on` since the store itself isn't `Sync` across an
/// `.await`.
pub struct InProcessRunner {
  extractor: Arc<dyn SpanExtractor>,
  enrichment_engine: Arc<EnrichmentEngine>,
  embedding_engines: Vec<Arc<EmbeddingEngine>>,
  enrichment_batch_size: usize,
  embedding_batch_size: usize,
  enrichment_cooldown_seconds: u64,
  snippet_max_chars: usize,
  max_batches_per_route: usize,
}

impl InProcessRunner {
  pub fn new(
    extractor: Arc<dyn SpanExtractor>,
    enrichment_engine: Arc<EnrichmentEngine>,
    embedding_engines: Vec<Arc<EmbeddingEngine>>,
  ) -> Self {
    Self {
      extractor,
      enrichment_engine,
      embedding_engines,
      enrichment_batch_size: 16,
      embedding_batch_size: 32,
      enrichment_cooldown_seconds: 0,
      snippet_max_chars: llmc_engine::DEFAULT_SNIPPET_MAX_CHARS,
      max_batches_per_route: 4,
    }
  }

  pub fn with_batch_sizes(mut self, enrichment: usize, embedding: usize) -> Self {
    self.enrichment_batch_size = enrichment;
    self.embedding_batch_size = embedding;
    self
  }

  pub fn with_cooldown_seconds(mut self, cooldown: u64) -> Self {
    self.enrichment_cooldown_seconds = cooldown;
    self
  }

  async fn run_inner(&self, job: &Job) -> Result<String, String> {
    let repo = job.repo.clone();
    let db_path = index_db_path(&repo);
    if let Some(parent) = db_path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let extractor = self.extractor.clone();
    let enrichment_engine = self.enrichment_engine.clone();
    let embedding_engines = self.embedding_engines.clone();
    let enrichment_batch_size = self.enrichment_batch_size;
    let embedding_batch_size = self.embedding_batch_size;
    let cooldown = self.enrichment_cooldown_seconds;
    let snippet_max_chars = self.snippet_max_chars;
    let max_batches = self.max_batches_per_route;
    let repo_root = repo.repo_path.clone();
    let workspace = repo.workspace_path.clone();
    let repo_id = repo.repo_id.clone();
    let handle = tokio::runtime::Handle::current();

    tokio::task::spawn_blocking(move || -> Result<String, String> {
      let mut store = IndexStore::open(&db_path).map_err(|e| e.to_string())?;

      let index_summary = reindex_repo(&mut store, extractor.as_ref(), &repo_root).map_err(|e| e.to_string())?;

      let mut enriched = 0usize;
      for _ in 0..max_batches {
        let items = plan_enrichment(&store, &repo_root, enrichment_batch_size, cooldown, snippet_max_chars)
          .map_err(|e| e.to_string())?;
        if items.is_empty() {
          break;
        }
        for item in &items {
          let (start_line, end_line) = store
            .span_line_range(&item.span_hash)
            .map_err(|e| e.to_string())?
            .unwrap_or((0, 0));
          let outcome = handle
            .block_on(enrichment_engine.enrich(&store, &workspace, &repo_id, item, start_line, end_line))
            .map_err(|e| e.to_string())?;
          if matches!(outcome, llmc_engine::EnrichmentOutcome::Success { .. }) {
            enriched += 1;
          }
        }
      }

      let mut embedded = 0usize;
      for engine in &embedding_engines {
        for _ in 0..max_batches {
          let items = llmc_engine::plan_embedding(
            &store,
            &repo_root,
            embedding_batch_size,
            engine.route(),
            snippet_max_chars,
          )
          .map_err(|e| e.to_string())?;
          if items.is_empty() {
            break;
          }
          let batch_outcome = handle.block_on(engine.embed_batch(&store, &items)).map_err(|e| e.to_string())?;
          embedded += batch_outcome.embedded;
        }
      }

      Ok(format!(
        "indexed: {} scanned, {} changed, {} deleted; enriched {}; embedded {}",
        index_summary.files_scanned, index_summary.files_changed, index_summary.files_deleted, enriched, embedded
      ))
    })
    .await
    .map_err(|e| e.to_string())?
  }
}

#[async_trait]
impl JobRunner for InProcessRunner {
  async fn run(&self, job: &Job) -> JobResult {
    match self.run_inner(job).await {
      Ok(summary) => JobResult {
        repo_id: job.repo.repo_id.clone(),
        success: true,
        exit_code: 0,
        error_reason: None,
        summary: Some(serde_json::Value::String(summary.clone())),
        stdout_tail: tail(&summary, TAIL_MAX_CHARS),
        stderr_tail: String::new(),
      },
      // An unhandled error in the closure is a failure with exit_code = -1,
      // matching the external-binary deployment form's convention.
      Err(reason) => JobResult {
        repo_id: job.repo.repo_id.clone(),
        success: false,
        exit_code: -1,
        error_reason: Some(reason.clone()),
        summary: None,
        stdout_tail: String::new(),
        stderr_tail: tail(&reason, TAIL_MAX_CHARS),
      },
    }
  }
}

/// Spawns `<command> --repo <repo_path> --workspace <workspace_path>
/// [--profile <profile>]` and maps its exit code to a `JobResult`. Exit 0 is
/// success; anything else is a failure with `error_reason` set to the
/// stderr tail, or `exit_code=N` if stderr was empty.
pub struct SubprocessRunner {
  command: String,
}

impl SubprocessRunner {
  pub fn new(command: impl Into<String>) -> Self {
    Self { command: command.into() }
  }
}

#[async_trait]
impl JobRunner for SubprocessRunner {
  async fn run(&self, job: &Job) -> JobResult {
    let mut cmd = Command::new(&self.command);
    cmd
      .arg("--repo")
      .arg(&job.repo.repo_path)
      .arg("--workspace")
      .arg(&job.repo.workspace_path);
    if let Some(profile) = &job.repo.profile {
      cmd.arg("--profile").arg(profile);
    }
    if job.force {
      cmd.arg("--force");
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    match cmd.output().await {
      Ok(output) => {
        let stdout_tail = tail(&String::from_utf8_lossy(&output.stdout), TAIL_MAX_CHARS);
        let stderr_tail = tail(&String::from_utf8_lossy(&output.stderr), TAIL_MAX_CHARS);
        let success = output.status.success();
        let error_reason = (!success).then(|| {
          if stderr_tail.is_empty() {
            format!("exit_code={}", output.status.code().unwrap_or(-1))
          } else {
            stderr_tail.clone()
          }
        });
        JobResult {
          repo_id: job.repo.repo_id.clone(),
          success,
          exit_code: output.status.code().unwrap_or(-1),
          error_reason,
          summary: None,
          stdout_tail,
          stderr_tail,
        }
      }
      Err(err) => JobResult {
        repo_id: job.repo.repo_id.clone(),
        success: false,
        exit_code: -1,
        error_reason: Some(err.to_string()),
        summary: None,
        stdout_tail: String::new(),
        stderr_tail: String::new(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tail_keeps_only_the_last_n_chars() {
    let text = "0123456789";
    assert_eq!(tail(text, 4), "6789");
    assert_eq!(tail(text, 100), text);
  }

  #[tokio::test]
  async fn subprocess_runner_reports_nonzero_exit_as_failure() {
    let runner = SubprocessRunner::new("false");
    let repo = RepoDescriptor::new(PathBuf::from("/tmp/repo"), PathBuf::from("/tmp/repo/.llmc/rag"));
    let job = Job {
      job_id: "job-1".to_string(),
      repo,
      force: false,
    };
    let result = runner.run(&job).await;
    assert!(!result.success);
    assert!(result.error_reason.is_some());
  }

  #[tokio::test]
  async fn subprocess_runner_reports_zero_exit_as_success() {
    let runner = SubprocessRunner::new("true");
    let repo = RepoDescriptor::new(PathBuf::from("/tmp/repo"), PathBuf::from("/tmp/repo/.llmc/rag"));
    let job = Job {
      job_id: "job-1".to_string(),
      repo,
      force: false,
    };
    let result = runner.run(&job).await;
    assert!(result.success);
  }
}
