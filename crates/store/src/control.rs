//! Flag-file based control surface, consumed once per scheduler tick.

use crate::error::Result;
use llmc_core::{ControlEvents, RepoId};
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct ControlSurface {
  dir: PathBuf,
}

impl ControlSurface {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  /// Scans `*.flag` files, deleting each as it's read. Delete failures are
  /// logged and otherwise ignored.
  pub fn read(&self) -> Result<ControlEvents> {
    let mut events = ControlEvents::default();
    if !self.dir.exists() {
      return Ok(events);
    }

    for entry in std::fs::read_dir(&self.dir)? {
      let entry = entry?;
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("flag") {
        continue;
      }
      let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        continue;
      };

      if name == "refresh_all.flag" {
        events.refresh_all = true;
      } else if name == "shutdown.flag" {
        events.shutdown = true;
      } else if let Some(repo_id) = name.strip_prefix("refresh_").and_then(|s| s.strip_suffix(".flag"))
        && !repo_id.is_empty()
      {
        events.refresh_repo_ids.push(RepoId::from(repo_id.to_string()));
      }

      if let Err(err) = std::fs::remove_file(&path) {
        warn!(path = %path.display(), error = %err, "failed to remove control flag");
      }
    }

    Ok(events)
  }

  pub fn write_flag(&self, name: &str) -> Result<()> {
    std::fs::create_dir_all(&self.dir)?;
    std::fs::write(self.flag_path(name), b"")?;
    Ok(())
  }

  fn flag_path(&self, name: &str) -> PathBuf {
    self.dir.join(format!("{name}.flag"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn missing_dir_yields_empty_events() {
    let dir = TempDir::new().unwrap();
    let control = ControlSurface::new(dir.path().join("missing"));
    let events = control.read().unwrap();
    assert!(!events.shutdown);
    assert!(!events.refresh_all);
    assert!(events.refresh_repo_ids.is_empty());
  }

  #[test]
  fn recognizes_all_flag_kinds_and_deletes_them() {
    let dir = TempDir::new().unwrap();
    let control = ControlSurface::new(dir.path());
    control.write_flag("shutdown").unwrap();
    control.write_flag("refresh_all").unwrap();
    control.write_flag("refresh_repo-a").unwrap();

    let events = control.read().unwrap();
    assert!(events.shutdown);
    assert!(events.refresh_all);
    assert_eq!(events.refresh_repo_ids, vec![RepoId::from("repo-a".to_string())]);

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
  }

  #[test]
  fn ignores_non_flag_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
    let control = ControlSurface::new(dir.path());
    let events = control.read().unwrap();
    assert!(!events.shutdown);
    assert!(dir.path().join("notes.txt").exists());
  }
}
