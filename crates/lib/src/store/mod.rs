//! Artifact storage keyed by module name and fingerprint.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! └── <module name>/
//!     ├── .staging-XXXX/          # in-flight store, renamed into place when complete
//!     └── <fingerprint>/          # immutable once published
//!         ├── .xcache-entry.json  # entry marker
//!         └── bundle/             # product files, exactly as stored
//! ```
//!
//! An entry exists exactly when its marker does. Readers never see a partly
//! written entry because staging directories only become visible by rename.

mod local;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::ENTRY_MARKER;
use crate::fingerprint::Fingerprint;
use crate::graph::Node;
use crate::util::hash::HashError;

pub use local::{LocalStorage, StoreEntry};

/// Identifies one stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub name: String,
  pub fingerprint: Fingerprint,
}

impl CacheKey {
  pub fn new(name: impl Into<String>, fingerprint: Fingerprint) -> Self {
    Self {
      name: name.into(),
      fingerprint,
    }
  }

  /// Key of a fingerprinted node; `None` before fingerprinting.
  pub fn for_node(node: &Node) -> Option<Self> {
    node.fingerprint().map(|fp| Self::new(node.name(), fp.clone()))
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.name, self.fingerprint)
  }
}

/// Bookkeeping written next to the bundle of every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMarker {
  pub name: String,
  pub fingerprint: Fingerprint,
  pub created_at_unix: u64,
  /// Hash of the bundle contents.
  pub content_hash: String,
}

impl EntryMarker {
  /// Read the marker of an entry directory. `Ok(None)` when the entry has none.
  pub fn read(entry: &Path) -> Result<Option<Self>, StoreError> {
    let path = entry.join(ENTRY_MARKER);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(StoreError::ReadMarker { path, source }),
    };
    serde_json::from_str(&content)
      .map(Some)
      .map_err(|source| StoreError::ParseMarker { path, source })
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("no artifact stored for {key}")]
  ArtifactMissing { key: String },

  #[error("invalid module name for the store: '{name}'")]
  InvalidKey { name: String },

  #[error("source directory {path} does not exist")]
  SourceMissing { path: PathBuf },

  #[error("failed to create {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy {from} into the store: {source}")]
  Copy {
    from: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to publish {path}: {source}")]
  Publish {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  ReadDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write entry marker {path}: {source}")]
  WriteMarker {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read entry marker {path}: {source}")]
  ReadMarker {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("malformed entry marker {path}: {source}")]
  ParseMarker {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to hash bundle: {0}")]
  Hash(#[from] HashError),
}

/// Where cached artifacts live.
///
/// Implementations must be safe against concurrent writers of the same key:
/// an entry is either absent or complete, never partial.
pub trait ArtifactStore {
  fn exists(&self, key: &CacheKey) -> bool;

  /// Store the contents of `source_dir` under `key`. Storing a key that
  /// already exists is a no-op.
  fn store(&self, key: &CacheKey, source_dir: &Path) -> Result<(), StoreError>;

  /// Directory holding the bundle stored under `key`: the same file set, with
  /// the same bytes, that was handed to `store`.
  fn retrieve(&self, key: &CacheKey) -> Result<PathBuf, StoreError>;

  /// Hash recorded for the bundle when it was stored, if the store keeps one.
  fn content_hash(&self, key: &CacheKey) -> Result<Option<String>, StoreError> {
    let _ = key;
    Ok(None)
  }
}
