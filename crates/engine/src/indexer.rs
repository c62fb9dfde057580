//! Walks a repo's working tree, reconciles it against the index store: new
//! and changed files get re-extracted into spans, files the store still
//! knows about but the walk no longer sees get dropped (cascading to their
//! enrichments and embeddings).

use crate::error::Result;
use crate::span_extractor::{detect_language, SpanExtractor};
use ignore::WalkBuilder;
use llmc_core::{span_hash, FileRecord, SpanRecord};
use llmc_store::IndexStore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::time::UNIX_EPOCH;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
  pub files_scanned: usize,
  pub files_changed: usize,
  pub files_deleted: usize,
  pub spans_added: usize,
  pub spans_deleted: usize,
}

/// Re-indexes `repo_root` against `store`. Respects `.gitignore` (and
/// global/local git excludes) the same way a normal `git status` would, so
/// generated and vendored trees never get extracted.
pub fn reindex_repo(store: &mut IndexStore, extractor: &dyn SpanExtractor, repo_root: &Path) -> Result<IndexSummary> {
  let mut summary = IndexSummary::default();
  let mut seen_paths: HashSet<String> = HashSet::new();

  let walker = WalkBuilder::new(repo_root)
    .follow_links(false)
    .hidden(false)
    .git_ignore(true)
    .git_global(true)
    .git_exclude(true)
    .build();

  for entry in walker.filter_map(|e| e.ok()) {
    if entry.file_type().is_none_or(|ft| !ft.is_file()) {
      continue;
    }
    let path = entry.path();
    let Some(lang) = detect_language(path) else {
      continue;
    };
    let Ok(relative) = path.strip_prefix(repo_root) else {
      continue;
    };
    let relative_path = relative.to_string_lossy().into_owned();
    let Ok(bytes) = std::fs::read(path) else {
      continue;
    };

    summary.files_scanned += 1;
    seen_paths.insert(relative_path.clone());

    let file_hash = content_hash(&bytes);
    if store.file_hash(&relative_path)?.as_deref() == Some(file_hash.as_str()) {
      continue;
    }
    summary.files_changed += 1;

    let mtime = entry
      .metadata()
      .ok()
      .and_then(|m| m.modified().ok())
      .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
      .map(|d| d.as_secs_f64())
      .unwrap_or(0.0);
    let file_record = FileRecord {
      id: 0,
      path: relative_path.clone(),
      lang: lang.to_string(),
      file_hash,
      size: bytes.len() as u64,
      mtime,
    };
    let file_id = store.upsert_file(&file_record)?;

    let spans: Vec<SpanRecord> = extractor
      .extract(path, lang, &bytes)
      .into_iter()
      .map(|candidate| {
        let start = (candidate.byte_start as usize).min(bytes.len());
        let end = (candidate.byte_end as usize).min(bytes.len()).max(start);
        SpanRecord {
          id: 0,
          file_id,
          symbol: candidate.symbol,
          kind: candidate.kind,
          start_line: candidate.start_line,
          end_line: candidate.end_line,
          byte_start: candidate.byte_start,
          byte_end: candidate.byte_end,
          span_hash: span_hash(lang, &bytes[start..end]),
          doc_hint: None,
          created_at: chrono::Utc::now(),
        }
      })
      .collect();

    let delta = store.replace_spans(file_id, &spans)?;
    summary.spans_added += delta.added;
    summary.spans_deleted += delta.deleted;
  }

  for known_path in store.list_file_paths()? {
    if !seen_paths.contains(&known_path) {
      store.delete_file(&known_path)?;
      summary.files_deleted += 1;
    }
  }

  Ok(summary)
}

fn content_hash(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}
