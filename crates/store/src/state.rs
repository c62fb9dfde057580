//! Durable per-repo refresh state, one JSON file per repo.

use crate::error::Result;
use llmc_core::{RepoId, RepoState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct StateStore {
  root: PathBuf,
}

impl StateStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn path_for(&self, repo_id: &RepoId) -> PathBuf {
    self.root.join(format!("{}.json", repo_id.as_str()))
  }

  pub fn get(&self, repo_id: &RepoId) -> Result<Option<RepoState>> {
    let path = self.path_for(repo_id);
    if !path.exists() {
      return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    match serde_json::from_str(&content) {
      Ok(state) => Ok(Some(state)),
      Err(err) => {
        warn!(repo_id = repo_id.as_str(), error = %err, "ignoring corrupt state file");
        Ok(None)
      }
    }
  }

  /// Loads every repo's state, silently skipping files that fail to parse.
  pub fn load_all(&self) -> Result<HashMap<RepoId, RepoState>> {
    let mut result = HashMap::new();
    if !self.root.exists() {
      return Ok(result);
    }
    for entry in std::fs::read_dir(&self.root)? {
      let entry = entry?;
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
          warn!(path = %path.display(), error = %err, "skipping unreadable state file");
          continue;
        }
      };
      match serde_json::from_str::<RepoState>(&content) {
        Ok(state) => {
          result.insert(state.repo_id.clone(), state);
        }
        Err(err) => {
          warn!(path = %path.display(), error = %err, "skipping corrupt state file");
        }
      }
    }
    Ok(result)
  }

  fn put(&self, state: &RepoState) -> Result<()> {
    std::fs::create_dir_all(&self.root)?;
    let path = self.path_for(&state.repo_id);
    let content = serde_json::to_string_pretty(state)?;
    let tmp = tmp_path_for(&path);
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
  }

  /// Loads the current state (or a fresh default), applies `mutator`, and
  /// writes the result back atomically. `mutator` must not perform I/O.
  pub fn update(&self, repo_id: &RepoId, mutator: impl FnOnce(RepoState) -> RepoState) -> Result<RepoState> {
    let current = self.get(repo_id)?.unwrap_or_else(|| RepoState::new(repo_id.clone()));
    let updated = mutator(current);
    self.put(&updated)?;
    Ok(updated)
  }
}

fn tmp_path_for(path: &Path) -> PathBuf {
  let mut tmp = path.as_os_str().to_os_string();
  tmp.push(".tmp");
  PathBuf::from(tmp)
}
