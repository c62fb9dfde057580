//! YAML-backed registry of repositories eligible for refresh.

use crate::error::Result;
use llmc_core::{RepoDescriptor, RepoId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Tolerates three payload shapes on disk: `{repos: [...]}`, a bare list, or
/// a map of `repo_id -> entry`. Always written back out in the `{repos:
/// [...]}` shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RegistryFile {
  #[serde(default)]
  repos: Vec<RepoEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RepoEntry {
  repo_id: String,
  repo_path: PathBuf,
  #[serde(default)]
  rag_workspace_path: Option<PathBuf>,
  #[serde(default)]
  rag_profile: Option<String>,
  #[serde(default)]
  min_refresh_interval_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegistryPayload {
  Wrapped(RegistryFile),
  List(Vec<RepoEntry>),
  Map(HashMap<String, RepoEntry>),
}

pub struct Registry {
  path: PathBuf,
}

impl Registry {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Loads the registry, silently dropping entries with sensitive or
  /// missing paths. Returns an empty map if the file does not exist or
  /// fails to parse.
  pub fn load(&self) -> Result<HashMap<RepoId, RepoDescriptor>> {
    let mut result = HashMap::new();
    if !self.path.exists() {
      return Ok(result);
    }

    let content = std::fs::read_to_string(&self.path)?;
    let payload: RegistryPayload = match serde_yaml::from_str(&content) {
      Ok(payload) => payload,
      Err(err) => {
        warn!(path = %self.path.display(), error = %err, "failed to parse registry, treating as empty");
        return Ok(result);
      }
    };

    let entries: Vec<(String, RepoEntry)> = match payload {
      RegistryPayload::Wrapped(file) => file.repos.into_iter().map(|e| (e.repo_id.clone(), e)).collect(),
      RegistryPayload::List(list) => list.into_iter().map(|e| (e.repo_id.clone(), e)).collect(),
      RegistryPayload::Map(map) => map.into_iter().collect(),
    };

    for (repo_id, entry) in entries {
      if repo_id.is_empty() {
        continue;
      }
      if !RepoDescriptor::is_safe_path(&entry.repo_path) {
        warn!(repo_id, path = %entry.repo_path.display(), "rejecting sensitive repo path");
        continue;
      }
      if let Some(ws) = &entry.rag_workspace_path
        && !RepoDescriptor::is_safe_path(ws)
      {
        warn!(repo_id, path = %ws.display(), "rejecting sensitive workspace path");
        continue;
      }

      let workspace_path = entry.rag_workspace_path.clone().unwrap_or_else(|| entry.repo_path.clone());
      let descriptor = RepoDescriptor {
        repo_id: RepoId::from(repo_id.clone()),
        repo_path: entry.repo_path,
        workspace_path,
        profile: entry.rag_profile,
        min_refresh_interval_secs: entry.min_refresh_interval_seconds,
        enabled: true,
      };
      result.insert(descriptor.repo_id.clone(), descriptor);
    }

    Ok(result)
  }

  /// Atomically replaces the registry file with `descriptors`.
  pub fn save(&self, descriptors: &HashMap<RepoId, RepoDescriptor>) -> Result<()> {
    let mut repos: Vec<RepoEntry> = descriptors
      .values()
      .map(|d| RepoEntry {
        repo_id: d.repo_id.as_str().to_string(),
        repo_path: d.repo_path.clone(),
        rag_workspace_path: Some(d.workspace_path.clone()),
        rag_profile: d.profile.clone(),
        min_refresh_interval_seconds: d.min_refresh_interval_secs,
      })
      .collect();
    repos.sort_by(|a, b| a.repo_id.cmp(&b.repo_id));

    let file = RegistryFile { repos };
    let yaml = serde_yaml::to_string(&file)?;

    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_path_for(&self.path);
    std::fs::write(&tmp_path, yaml)?;
    std::fs::rename(&tmp_path, &self.path)?;
    Ok(())
  }
}

fn tmp_path_for(path: &Path) -> PathBuf {
  let mut tmp = path.as_os_str().to_os_string();
  tmp.push(".tmp");
  PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn descriptor(id: &str, path: &str) -> RepoDescriptor {
    let mut d = RepoDescriptor::new(PathBuf::from(path), PathBuf::from(path));
    d.repo_id = RepoId::from(id.to_string());
    d
  }

  #[test]
  fn round_trips_through_save_and_load() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new(dir.path().join("repos.yml"));

    let mut descriptors = HashMap::new();
    let d = descriptor("repo-a", "/srv/repos/a");
    descriptors.insert(d.repo_id.clone(), d);

    registry.save(&descriptors).unwrap();
    let loaded = registry.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(loaded.contains_key(&RepoId::from("repo-a".to_string())));
  }

  #[test]
  fn missing_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new(dir.path().join("missing.yml"));
    assert!(registry.load().unwrap().is_empty());
  }

  #[test]
  fn rejects_sensitive_paths() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("repos.yml");
    std::fs::write(
      &path,
      "repos:\n  - repo_id: bad\n    repo_path: /etc/secrets\n  - repo_id: good\n    repo_path: /srv/repos/good\n",
    )
    .unwrap();

    let registry = Registry::new(path);
    let loaded = registry.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(loaded.contains_key(&RepoId::from("good".to_string())));
  }

  #[test]
  fn accepts_bare_list_shape() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("repos.yml");
    std::fs::write(&path, "- repo_id: a\n  repo_path: /srv/repos/a\n").unwrap();

    let registry = Registry::new(path);
    let loaded = registry.load().unwrap();
    assert_eq!(loaded.len(), 1);
  }

  #[test]
  fn accepts_map_of_entries_shape() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("repos.yml");
    std::fs::write(&path, "a:\n  repo_id: a\n  repo_path: /srv/repos/a\n").unwrap();

    let registry = Registry::new(path);
    let loaded = registry.load().unwrap();
    assert_eq!(loaded.len(), 1);
  }
}
