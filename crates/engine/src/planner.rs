//! Turns `IndexStore` queries into ready-to-process work items: reads the
//! span's bytes off disk and attaches a snippet, then applies a diversity
//! pass so one markdown-heavy file can't crowd out an entire batch.

use crate::error::Result;
use llmc_core::{EmbeddingWorkItem, EnrichmentWorkItem};
use llmc_store::{IndexStore, PendingSpan};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 800;

/// Over-fetch factor applied before the diversity pass so it has enough
/// candidates across distinct files to round-robin over.
const DIVERSITY_OVER_FETCH: usize = 3;

fn read_snippet(repo_root: &Path, span: &PendingSpan, snippet_max_chars: usize) -> String {
  let path = repo_root.join(&span.file_path);
  let bytes = match fs::read(&path) {
    Ok(b) => b,
    Err(_) => return String::new(),
  };
  let start = (span.byte_start as usize).min(bytes.len());
  let end = (span.byte_end as usize).min(bytes.len()).max(start);
  let text = String::from_utf8_lossy(&bytes[start..end]);
  text.chars().take(snippet_max_chars).collect()
}

/// Groups candidates by file (preserving first-seen order) and interleaves
/// them round-robin, so a batch draws from as many distinct files as
/// possible before repeating within one.
fn diversify(candidates: Vec<PendingSpan>, limit: usize) -> Vec<PendingSpan> {
  if candidates.len() <= limit {
    return candidates;
  }

  let mut buckets: HashMap<String, Vec<PendingSpan>> = HashMap::new();
  let mut order: Vec<String> = Vec::new();
  for span in candidates {
    let key = span.file_path.clone();
    if !buckets.contains_key(&key) {
      order.push(key.clone());
    }
    buckets.entry(key).or_default().push(span);
  }

  let mut result = Vec::with_capacity(limit);
  loop {
    let mut progressed = false;
    for key in &order {
      if result.len() >= limit {
        return result;
      }
      if let Some(bucket) = buckets.get_mut(key)
        && !bucket.is_empty()
      {
        result.push(bucket.remove(0));
        progressed = true;
      }
    }
    if !progressed {
      break;
    }
  }
  result
}

/// Builds a batch of enrichment work items: candidates not yet enriched,
/// cooldown-filtered, diversified across files, truncated to `limit`.
pub fn plan_enrichment(
  store: &IndexStore,
  repo_root: &Path,
  limit: usize,
  cooldown_seconds: u64,
  snippet_max_chars: usize,
) -> Result<Vec<EnrichmentWorkItem>> {
  let candidates = store.pending_enrichments(limit * DIVERSITY_OVER_FETCH, cooldown_seconds)?;
  let chosen = diversify(candidates, limit);
  Ok(
    chosen
      .into_iter()
      .map(|span| {
        let snippet = read_snippet(repo_root, &span, snippet_max_chars);
        EnrichmentWorkItem {
          span_hash: span.span_hash,
          file_path: span.file_path,
          lang: span.lang,
          symbol: span.symbol,
          snippet,
        }
      })
      .collect(),
  )
}

/// Builds a batch of embedding work items for `route`: candidates with no
/// embedding row yet under that route, diversified across files.
pub fn plan_embedding(
  store: &IndexStore,
  repo_root: &Path,
  limit: usize,
  route: &str,
  snippet_max_chars: usize,
) -> Result<Vec<EmbeddingWorkItem>> {
  let candidates = store.pending_embeddings(route, limit * DIVERSITY_OVER_FETCH)?;
  let chosen = diversify(candidates, limit);
  Ok(
    chosen
      .into_iter()
      .map(|span| {
        let text = read_snippet(repo_root, &span, snippet_max_chars);
        EmbeddingWorkItem {
          span_hash: span.span_hash,
          route: route.to_string(),
          profile: None,
          text,
        }
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use llmc_core::{FileRecord, SpanRecord};
  use std::io::Write;

  fn file_record(path: &str) -> FileRecord {
    FileRecord {
      id: 0,
      path: path.to_string(),
      lang: "rust".to_string(),
      file_hash: "h".to_string(),
      size: 10,
      mtime: 0.0,
    }
  }

  fn span_record(hash: &str, symbol: &str, byte_end: u64) -> SpanRecord {
    SpanRecord {
      id: 0,
      file_id: 0,
      symbol: symbol.to_string(),
      kind: "function".to_string(),
      start_line: 1,
      end_line: 2,
      byte_start: 0,
      byte_end,
      span_hash: hash.to_string(),
      doc_hint: None,
      created_at: chrono::Utc::now(),
    }
  }

  #[test]
  fn plan_enrichment_reads_snippet_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("a.rs");
    std::fs::File::create(&file_path).unwrap().write_all(b"fn main() {}").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    let file_id = store.upsert_file(&file_record("a.rs")).unwrap();
    store.replace_spans(file_id, &[span_record("h1", "main", 12)]).unwrap();

    let plan = plan_enrichment(&store, dir.path(), 10, 0, 800).unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].symbol, "main");
    assert_eq!(plan[0].snippet, "fn main() {}");
  }

  #[test]
  fn diversify_prefers_distinct_files_before_limit() {
    let mut spans = Vec::new();
    for file_idx in 0..2 {
      for span_idx in 0..3 {
        spans.push(PendingSpan {
          span_hash: format!("f{file_idx}s{span_idx}"),
          file_path: format!("file{file_idx}.rs"),
          lang: "rust".to_string(),
          symbol: "s".to_string(),
          start_line: 1,
          end_line: 1,
          byte_start: 0,
          byte_end: 0,
        });
      }
    }
    let chosen = diversify(spans, 2);
    assert_eq!(chosen.len(), 2);
    let files: std::collections::HashSet<_> = chosen.iter().map(|s| s.file_path.clone()).collect();
    assert_eq!(files.len(), 2, "should draw from both files before repeating");
  }
}
