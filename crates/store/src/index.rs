//! SQLite-backed index of files, spans, enrichments, and embeddings for a
//! single repository.

use crate::error::{Result, StoreError};
use llmc_core::{EnrichmentRecord, FileRecord, SpanRecord};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    path TEXT UNIQUE NOT NULL,
    lang TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    mtime REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS spans (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    symbol TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    byte_start INTEGER NOT NULL,
    byte_end INTEGER NOT NULL,
    span_hash TEXT NOT NULL UNIQUE,
    doc_hint TEXT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS embeddings_meta (
    model TEXT PRIMARY KEY,
    dim INTEGER NOT NULL,
    created_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS embeddings (
    span_hash TEXT NOT NULL,
    route TEXT NOT NULL,
    profile_name TEXT,
    vec BLOB NOT NULL,
    PRIMARY KEY (span_hash, route),
    FOREIGN KEY (span_hash) REFERENCES spans(span_hash) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS enrichments (
    span_hash TEXT PRIMARY KEY,
    summary TEXT,
    tags TEXT,
    evidence TEXT,
    model TEXT,
    created_at DATETIME,
    schema_ver TEXT,
    inputs TEXT,
    outputs TEXT,
    side_effects TEXT,
    pitfalls TEXT,
    usage_snippet TEXT,
    FOREIGN KEY (span_hash) REFERENCES spans(span_hash) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS tech_docs_edges (
    span_hash TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    relation TEXT NOT NULL,
    weight REAL NOT NULL,
    PRIMARY KEY (span_hash, doc_id, relation),
    FOREIGN KEY (span_hash) REFERENCES spans(span_hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_files_path ON files(path);
CREATE INDEX IF NOT EXISTS idx_spans_file_id ON spans(file_id);
CREATE INDEX IF NOT EXISTS idx_spans_span_hash ON spans(span_hash);
"#;

/// A span awaiting enrichment or embedding, with enough context to build a
/// prompt or passage without a second round-trip.
#[derive(Debug, Clone)]
pub struct PendingSpan {
  pub span_hash: String,
  pub file_path: String,
  pub lang: String,
  pub symbol: String,
  pub start_line: u32,
  pub end_line: u32,
  pub byte_start: u64,
  pub byte_end: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexStats {
  pub files: i64,
  pub spans: i64,
  pub enrichments: i64,
  pub embeddings: i64,
}

/// Result of a differential span replace: which span hashes were added,
/// removed, or left untouched (and thus keep their enrichments/embeddings).
#[derive(Debug, Default, Clone)]
pub struct SpanDelta {
  pub added: usize,
  pub deleted: usize,
  pub unchanged: usize,
}

pub struct IndexStore {
  conn: Connection,
}

impl IndexStore {
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = match Connection::open(path) {
      Ok(conn) => conn,
      Err(err) => {
        warn!(path = %path.display(), error = %err, "failed to open index store, quarantining");
        quarantine(path)?;
        Connection::open(path)?
      }
    };
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn })
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn })
  }

  /// Inserts or updates a file row, returning its id.
  pub fn upsert_file(&self, record: &FileRecord) -> Result<i64> {
    self.conn.execute(
      "INSERT INTO files(path, lang, file_hash, size, mtime) VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT(path) DO UPDATE SET lang = excluded.lang, file_hash = excluded.file_hash,
         size = excluded.size, mtime = excluded.mtime",
      params![record.path, record.lang, record.file_hash, record.size as i64, record.mtime],
    )?;
    let id: i64 = self
      .conn
      .query_row("SELECT id FROM files WHERE path = ?1", params![record.path], |row| row.get(0))?;
    Ok(id)
  }

  pub fn file_hash(&self, path: &str) -> Result<Option<String>> {
    Ok(
      self
        .conn
        .query_row("SELECT file_hash FROM files WHERE path = ?1", params![path], |row| row.get(0))
        .optional()?,
    )
  }

  pub fn delete_file(&self, path: &str) -> Result<()> {
    self.conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
    Ok(())
  }

  /// Every tracked file path, for reconciling a fresh directory walk against
  /// what the store already knows about.
  pub fn list_file_paths(&self) -> Result<Vec<String>> {
    let mut stmt = self.conn.prepare("SELECT path FROM files")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<std::result::Result<_, _>>()?)
  }

  /// Differentially replaces the spans for `file_id`: spans whose
  /// `span_hash` already exists are left untouched (preserving their
  /// enrichments and embeddings via the FK), spans no longer present are
  /// deleted (cascading), and new spans are inserted. Runs in a single
  /// transaction.
  pub fn replace_spans(&mut self, file_id: i64, spans: &[SpanRecord]) -> Result<SpanDelta> {
    let tx = self.conn.transaction()?;

    let existing_hashes: HashSet<String> = {
      let mut stmt = tx.prepare("SELECT span_hash FROM spans WHERE file_id = ?1")?;
      let rows = stmt.query_map(params![file_id], |row| row.get::<_, String>(0))?;
      rows.collect::<std::result::Result<_, _>>()?
    };
    let new_hashes: HashSet<String> = spans.iter().map(|s| s.span_hash.clone()).collect();

    let to_delete: Vec<&String> = existing_hashes.difference(&new_hashes).collect();
    let to_add: Vec<&SpanRecord> = spans.iter().filter(|s| !existing_hashes.contains(&s.span_hash)).collect();
    let unchanged = existing_hashes.intersection(&new_hashes).count();

    if !to_delete.is_empty() {
      let placeholders = vec!["?"; to_delete.len()].join(",");
      let sql = format!("DELETE FROM spans WHERE span_hash IN ({placeholders})");
      let params: Vec<&dyn rusqlite::ToSql> = to_delete.iter().map(|h| *h as &dyn rusqlite::ToSql).collect();
      tx.execute(&sql, params.as_slice())?;
    }

    for span in &to_add {
      tx.execute(
        "INSERT OR REPLACE INTO spans
           (file_id, symbol, kind, start_line, end_line, byte_start, byte_end, span_hash, doc_hint)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
          file_id,
          span.symbol,
          span.kind,
          span.start_line,
          span.end_line,
          span.byte_start as i64,
          span.byte_end as i64,
          span.span_hash,
          span.doc_hint,
        ],
      )?;
    }

    let delta = SpanDelta {
      added: to_add.len(),
      deleted: to_delete.len(),
      unchanged,
    };
    tx.commit()?;
    Ok(delta)
  }

  /// Deletes any span not in `valid_span_hashes`, cascading to its
  /// enrichments and embeddings.
  pub fn remove_missing_spans(&self, valid_span_hashes: &[String]) -> Result<()> {
    if valid_span_hashes.is_empty() {
      return Ok(());
    }
    let placeholders = vec!["?"; valid_span_hashes.len()].join(",");
    let sql = format!("DELETE FROM spans WHERE span_hash NOT IN ({placeholders})");
    let params: Vec<&dyn rusqlite::ToSql> = valid_span_hashes.iter().map(|h| h as &dyn rusqlite::ToSql).collect();
    self.conn.execute(&sql, params.as_slice())?;
    Ok(())
  }

  pub fn stats(&self) -> Result<IndexStats> {
    let files = self.conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
    let spans = self.conn.query_row("SELECT COUNT(*) FROM spans", [], |row| row.get(0))?;
    let enrichments = self.conn.query_row("SELECT COUNT(*) FROM enrichments", [], |row| row.get(0))?;
    let embeddings = self.conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
    Ok(IndexStats { files, spans, enrichments, embeddings })
  }

  /// Spans with no enrichment row yet, oldest-inserted first. Over-fetches
  /// by 5x to leave room for `cooldown_seconds` filtering on file mtime.
  pub fn pending_enrichments(&self, limit: usize, cooldown_seconds: u64) -> Result<Vec<PendingSpan>> {
    let candidate_limit = (limit * 5).max(limit) as i64;
    let mut stmt = self.conn.prepare(
      "SELECT spans.span_hash, files.path, files.lang, spans.symbol, spans.start_line, spans.end_line,
              spans.byte_start, spans.byte_end, files.mtime
       FROM spans
       JOIN files ON spans.file_id = files.id
       LEFT JOIN enrichments ON spans.span_hash = enrichments.span_hash
       WHERE enrichments.span_hash IS NULL
       ORDER BY spans.id
       LIMIT ?1",
    )?;
    let now = chrono::Utc::now().timestamp() as f64;
    let rows = stmt.query_map(params![candidate_limit], |row| {
      Ok((
        PendingSpan {
          span_hash: row.get(0)?,
          file_path: row.get(1)?,
          lang: row.get(2)?,
          symbol: row.get(3)?,
          start_line: row.get(4)?,
          end_line: row.get(5)?,
          byte_start: row.get::<_, i64>(6)? as u64,
          byte_end: row.get::<_, i64>(7)? as u64,
        },
        row.get::<_, f64>(8)?,
      ))
    })?;

    let mut filtered = Vec::with_capacity(limit);
    for row in rows {
      let (span, mtime) = row?;
      if cooldown_seconds > 0 && now - mtime < cooldown_seconds as f64 {
        continue;
      }
      filtered.push(span);
      if filtered.len() == limit {
        break;
      }
    }
    Ok(filtered)
  }

  /// `(start_line, end_line)` for a span, looked up by hash. Used by callers
  /// that already have a work item (which carries no line range of its own)
  /// and need it to build evidence strings.
  pub fn span_line_range(&self, span_hash: &str) -> Result<Option<(u32, u32)>> {
    Ok(
      self
        .conn
        .query_row(
          "SELECT start_line, end_line FROM spans WHERE span_hash = ?1",
          params![span_hash],
          |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?,
    )
  }

  pub fn store_enrichment(&self, enrichment: &EnrichmentRecord) -> Result<()> {
    self.conn.execute(
      "INSERT OR REPLACE INTO enrichments
         (span_hash, summary, tags, evidence, model, created_at, schema_ver,
          inputs, outputs, side_effects, pitfalls, usage_snippet)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
      params![
        enrichment.span_hash,
        enrichment.summary,
        enrichment.tags.join(","),
        serde_json::to_string(&enrichment.evidence)?,
        enrichment.model,
        enrichment.created_at.to_rfc3339(),
        enrichment.schema_ver,
        serde_json::to_string(&enrichment.inputs)?,
        serde_json::to_string(&enrichment.outputs)?,
        serde_json::to_string(&enrichment.side_effects)?,
        serde_json::to_string(&enrichment.pitfalls)?,
        enrichment.usage_snippet,
      ],
    )?;
    Ok(())
  }

  /// Spans with no embedding row for `route` yet.
  pub fn pending_embeddings(&self, route: &str, limit: usize) -> Result<Vec<PendingSpan>> {
    let mut stmt = self.conn.prepare(
      "SELECT spans.span_hash, files.path, files.lang, spans.symbol, spans.start_line, spans.end_line,
              spans.byte_start, spans.byte_end
       FROM spans
       JOIN files ON spans.file_id = files.id
       LEFT JOIN embeddings ON spans.span_hash = embeddings.span_hash AND embeddings.route = ?1
       WHERE embeddings.span_hash IS NULL
       ORDER BY spans.id
       LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![route, limit as i64], |row| {
      Ok(PendingSpan {
        span_hash: row.get(0)?,
        file_path: row.get(1)?,
        lang: row.get(2)?,
        symbol: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        byte_start: row.get::<_, i64>(6)? as u64,
        byte_end: row.get::<_, i64>(7)? as u64,
      })
    })?;
    Ok(rows.collect::<std::result::Result<_, _>>()?)
  }

  pub fn ensure_embedding_meta(&self, model: &str, dim: usize) -> Result<()> {
    self.conn.execute(
      "INSERT INTO embeddings_meta(model, dim, created_at) VALUES (?1, ?2, strftime('%s','now'))
       ON CONFLICT(model) DO UPDATE SET dim = excluded.dim, created_at = excluded.created_at",
      params![model, dim as i64],
    )?;
    Ok(())
  }

  /// Idempotent: `INSERT OR REPLACE` on `(span_hash, route)`.
  pub fn store_embedding(&self, span_hash: &str, route: &str, profile_name: Option<&str>, vector: &[f32]) -> Result<()> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
      blob.extend_from_slice(&v.to_le_bytes());
    }
    self.conn.execute(
      "INSERT OR REPLACE INTO embeddings(span_hash, route, profile_name, vec) VALUES (?1, ?2, ?3, ?4)",
      params![span_hash, route, profile_name, blob],
    )?;
    Ok(())
  }

  pub fn store_graph_edge(&self, span_hash: &str, doc_id: &str, relation: &str, weight: f32) -> Result<()> {
    self.conn.execute(
      "INSERT OR REPLACE INTO tech_docs_edges(span_hash, doc_id, relation, weight) VALUES (?1, ?2, ?3, ?4)",
      params![span_hash, doc_id, relation, weight],
    )?;
    Ok(())
  }
}

fn quarantine(path: &Path) -> Result<()> {
  if !path.exists() {
    return Ok(());
  }
  let timestamp = chrono::Utc::now().timestamp();
  let mut quarantined: PathBuf = path.to_path_buf();
  let name = quarantined
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  quarantined.set_file_name(format!("{name}.corrupt-{timestamp}"));
  std::fs::rename(path, &quarantined).map_err(|e| StoreError::Corrupt {
    path: path.display().to_string(),
    reason: e.to_string(),
  })?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn file_record(path: &str) -> FileRecord {
    FileRecord {
      id: 0,
      path: path.to_string(),
      lang: "rust".to_string(),
      file_hash: "h1".to_string(),
      size: 10,
      mtime: 0.0,
    }
  }

  fn span_record(hash: &str) -> SpanRecord {
    SpanRecord {
      id: 0,
      file_id: 0,
      symbol: "foo".to_string(),
      kind: "function".to_string(),
      start_line: 1,
      end_line: 2,
      byte_start: 0,
      byte_end: 10,
      span_hash: hash.to_string(),
      doc_hint: None,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn upsert_file_is_idempotent_on_path() {
    let store = IndexStore::open_in_memory().unwrap();
    let id1 = store.upsert_file(&file_record("a.rs")).unwrap();
    let id2 = store.upsert_file(&file_record("a.rs")).unwrap();
    assert_eq!(id1, id2);
  }

  #[test]
  fn replace_spans_preserves_unchanged_and_drops_removed() {
    let mut store = IndexStore::open_in_memory().unwrap();
    let file_id = store.upsert_file(&file_record("a.rs")).unwrap();

    store.replace_spans(file_id, &[span_record("h1"), span_record("h2")]).unwrap();
    let enrichment = EnrichmentRecord {
      span_hash: "h1".to_string(),
      summary: "does a thing".to_string(),
      tags: vec!["x".to_string()],
      evidence: vec![],
      model: "qwen2.5:7b".to_string(),
      created_at: Utc::now(),
      schema_ver: "enrichment.v1".to_string(),
      inputs: vec![],
      outputs: vec![],
      side_effects: vec![],
      pitfalls: vec![],
      usage_snippet: String::new(),
    };
    store.store_enrichment(&enrichment).unwrap();

    let delta = store.replace_spans(file_id, &[span_record("h1"), span_record("h3")]).unwrap();
    assert_eq!(delta.added, 1);
    assert_eq!(delta.deleted, 1);
    assert_eq!(delta.unchanged, 1);

    let stats = store.stats().unwrap();
    assert_eq!(stats.spans, 2);
    assert_eq!(stats.enrichments, 1, "enrichment for unchanged span h1 must survive");
  }

  #[test]
  fn cascade_delete_removes_enrichments_and_embeddings() {
    let mut store = IndexStore::open_in_memory().unwrap();
    let file_id = store.upsert_file(&file_record("a.rs")).unwrap();
    store.replace_spans(file_id, &[span_record("h1")]).unwrap();
    store.store_embedding("h1", "default", None, &[0.1, 0.2]).unwrap();

    store.remove_missing_spans(&[]).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.spans, 0);
    assert_eq!(stats.embeddings, 0, "FK cascade must remove embeddings for deleted spans");
  }

  #[test]
  fn pending_enrichments_excludes_already_enriched() {
    let mut store = IndexStore::open_in_memory().unwrap();
    let file_id = store.upsert_file(&file_record("a.rs")).unwrap();
    store.replace_spans(file_id, &[span_record("h1"), span_record("h2")]).unwrap();
    store
      .store_enrichment(&EnrichmentRecord {
        span_hash: "h1".to_string(),
        summary: String::new(),
        tags: vec![],
        evidence: vec![],
        model: "m".to_string(),
        created_at: Utc::now(),
        schema_ver: "v1".to_string(),
        inputs: vec![],
        outputs: vec![],
        side_effects: vec![],
        pitfalls: vec![],
        usage_snippet: String::new(),
      })
      .unwrap();

    let pending = store.pending_enrichments(10, 0).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].span_hash, "h2");
  }

  #[test]
  fn list_file_paths_reflects_deletes() {
    let store = IndexStore::open_in_memory().unwrap();
    store.upsert_file(&file_record("a.rs")).unwrap();
    store.upsert_file(&file_record("b.rs")).unwrap();
    let mut paths = store.list_file_paths().unwrap();
    paths.sort();
    assert_eq!(paths, vec!["a.rs".to_string(), "b.rs".to_string()]);

    store.delete_file("a.rs").unwrap();
    assert_eq!(store.list_file_paths().unwrap(), vec!["b.rs".to_string()]);
  }

  #[test]
  fn span_line_range_looks_up_by_hash() {
    let mut store = IndexStore::open_in_memory().unwrap();
    let file_id = store.upsert_file(&file_record("a.rs")).unwrap();
    store.replace_spans(file_id, &[span_record("h1")]).unwrap();
    assert_eq!(store.span_line_range("h1").unwrap(), Some((1, 2)));
    assert_eq!(store.span_line_range("missing").unwrap(), None);
  }

  #[test]
  fn store_embedding_is_idempotent() {
    let mut store = IndexStore::open_in_memory().unwrap();
    let file_id = store.upsert_file(&file_record("a.rs")).unwrap();
    store.replace_spans(file_id, &[span_record("h1")]).unwrap();
    store.store_embedding("h1", "default", None, &[1.0, 2.0]).unwrap();
    store.store_embedding("h1", "default", None, &[3.0, 4.0]).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.embeddings, 1);
  }
}
