use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ArtifactStore, CacheKey, EntryMarker, StoreError};
use crate::consts::{BUNDLE_DIR_NAME, ENTRY_MARKER, STAGING_PREFIX};
use crate::util::fs::{copy_dir_contents, dir_size, remove_path};
use crate::util::hash::hash_directory;

/// Artifact store on a local (or mounted) filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
  root: PathBuf,
}

/// A published entry, as reported by [`LocalStorage::entries`].
#[derive(Debug, Clone, Serialize)]
pub struct StoreEntry {
  pub name: String,
  pub fingerprint: String,
  pub path: PathBuf,
  pub created_at_unix: Option<u64>,
  pub size_bytes: u64,
}

impl LocalStorage {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn entry_dir(&self, key: &CacheKey) -> Result<PathBuf, StoreError> {
    check_component(&key.name)?;
    check_component(key.fingerprint.as_str())?;
    Ok(self.root.join(&key.name).join(key.fingerprint.as_str()))
  }

  /// Every published entry, sorted by module name then fingerprint.
  pub fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
    let mut entries = Vec::new();
    for module_dir in visible_dirs(&self.root)? {
      let name = file_name(&module_dir);
      for entry_dir in visible_dirs(&module_dir)? {
        if !entry_dir.join(ENTRY_MARKER).is_file() {
          continue;
        }
        let marker = EntryMarker::read(&entry_dir).unwrap_or_else(|e| {
          warn!(path = %entry_dir.display(), error = %e, "unreadable entry marker");
          None
        });
        entries.push(StoreEntry {
          name: name.clone(),
          fingerprint: file_name(&entry_dir),
          created_at_unix: marker.map(|m| m.created_at_unix),
          size_bytes: dir_size(&entry_dir),
          path: entry_dir,
        });
      }
    }
    Ok(entries)
  }

  /// Remove every entry of one module. Returns how many entries were removed.
  pub fn remove(&self, name: &str) -> Result<usize, StoreError> {
    check_component(name)?;
    let removed = self.entries()?.iter().filter(|e| e.name == name).count();
    let module_dir = self.root.join(name);
    remove_path(&module_dir).map_err(|source| StoreError::Remove {
      path: module_dir.clone(),
      source,
    })?;
    info!(module = name, removed, "removed cached module");
    Ok(removed)
  }

  /// Empty the store. Returns how many entries were removed.
  pub fn clear(&self) -> Result<usize, StoreError> {
    let removed = self.entries()?.len();
    if !self.root.exists() {
      return Ok(0);
    }
    let children = fs::read_dir(&self.root).map_err(|source| StoreError::ReadDir {
      path: self.root.clone(),
      source,
    })?;
    for child in children {
      let child = child
        .map_err(|source| StoreError::ReadDir {
          path: self.root.clone(),
          source,
        })?
        .path();
      remove_path(&child).map_err(|source| StoreError::Remove { path: child, source })?;
    }
    info!(root = %self.root.display(), removed, "cleared store");
    Ok(removed)
  }
}

impl ArtifactStore for LocalStorage {
  fn exists(&self, key: &CacheKey) -> bool {
    self
      .entry_dir(key)
      .map(|dir| dir.join(ENTRY_MARKER).is_file())
      .unwrap_or(false)
  }

  fn store(&self, key: &CacheKey, source_dir: &Path) -> Result<(), StoreError> {
    let dest = self.entry_dir(key)?;
    if self.exists(key) {
      debug!(key = %key, "artifact already stored");
      return Ok(());
    }
    if !source_dir.is_dir() {
      return Err(StoreError::SourceMissing {
        path: source_dir.to_path_buf(),
      });
    }

    let module_dir = self.root.join(&key.name);
    fs::create_dir_all(&module_dir).map_err(|source| StoreError::CreateDir {
      path: module_dir.clone(),
      source,
    })?;
    // Dropped on every early return, taking the partial copy with it.
    let staging = tempfile::Builder::new()
      .prefix(STAGING_PREFIX)
      .tempdir_in(&module_dir)
      .map_err(|source| StoreError::CreateDir {
        path: module_dir.clone(),
        source,
      })?;

    let staged_bundle = staging.path().join(BUNDLE_DIR_NAME);
    copy_dir_contents(source_dir, &staged_bundle, &[]).map_err(|source| StoreError::Copy {
      from: source_dir.to_path_buf(),
      source,
    })?;

    let marker = EntryMarker {
      name: key.name.clone(),
      fingerprint: key.fingerprint.clone(),
      created_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0),
      content_hash: hash_directory(&staged_bundle, &[])?.0,
    };
    let marker_path = staging.path().join(ENTRY_MARKER);
    let json = serde_json::to_string_pretty(&marker).map_err(|e| StoreError::WriteMarker {
      path: marker_path.clone(),
      source: io::Error::other(e),
    })?;
    fs::write(&marker_path, json).map_err(|source| StoreError::WriteMarker {
      path: marker_path.clone(),
      source,
    })?;

    // A directory without a marker is debris from an interrupted store.
    if dest.exists() && !self.exists(key) {
      warn!(path = %dest.display(), "replacing incomplete entry");
      remove_path(&dest).map_err(|source| StoreError::Remove {
        path: dest.clone(),
        source,
      })?;
    }

    match fs::rename(staging.path(), &dest) {
      Ok(()) => {
        info!(key = %key, path = %dest.display(), "stored artifact");
        Ok(())
      }
      Err(_) if self.exists(key) => {
        debug!(key = %key, "artifact published concurrently");
        Ok(())
      }
      Err(source) => Err(StoreError::Publish { path: dest, source }),
    }
  }

  fn retrieve(&self, key: &CacheKey) -> Result<PathBuf, StoreError> {
    let dir = self.entry_dir(key)?;
    if !dir.join(ENTRY_MARKER).is_file() {
      return Err(StoreError::ArtifactMissing { key: key.to_string() });
    }
    Ok(dir.join(BUNDLE_DIR_NAME))
  }

  fn content_hash(&self, key: &CacheKey) -> Result<Option<String>, StoreError> {
    let marker = EntryMarker::read(&self.entry_dir(key)?)?;
    Ok(marker.map(|m| m.content_hash))
  }
}

/// Module names and fingerprints become single path components.
fn check_component(name: &str) -> Result<(), StoreError> {
  let valid = !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\', '\0']);
  if valid {
    Ok(())
  } else {
    Err(StoreError::InvalidKey { name: name.to_string() })
  }
}

fn visible_dirs(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
  let read_err = |source| StoreError::ReadDir {
    path: dir.to_path_buf(),
    source,
  };
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(read_err(e)),
  };

  let mut dirs = Vec::new();
  for entry in entries {
    let entry = entry.map_err(read_err)?;
    let hidden = entry.file_name().to_string_lossy().starts_with('.');
    if !hidden && entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
      dirs.push(entry.path());
    }
  }
  dirs.sort();
  Ok(dirs)
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default()
}
