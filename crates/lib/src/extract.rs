//! Copies cached bundles out of the store into the per-run working area.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::graph::{Graph, Node};
use crate::store::{ArtifactStore, CacheKey, StoreError};
use crate::util::fs::{copy_dir_contents, remove_path, reset_dir};
use crate::util::hash::{HashError, hash_directory};

#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("module '{node}' has no fingerprint")]
  MissingFingerprint { node: String },

  #[error("module '{node}' was evaluated as cached but the store has no artifact for {key}")]
  ArtifactMissing { node: String, key: String },

  #[error("cached bundle for '{node}' does not match its recorded hash (expected {expected}, got {actual})")]
  CorruptArtifact {
    node: String,
    expected: String,
    actual: String,
  },

  #[error("failed to unpack into {path}: {source}")]
  Unpack {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Hash(#[from] HashError),
}

/// Where a module's unpacked products live: `<unpacked root>/<module name>`.
pub fn unpacked_location(unpacked_root: &Path, name: &str) -> PathBuf {
  unpacked_root.join(name)
}

pub struct ArtifactExtractor<'a> {
  store: &'a dyn ArtifactStore,
  unpacked_root: PathBuf,
}

impl<'a> ArtifactExtractor<'a> {
  pub fn new(store: &'a dyn ArtifactStore, unpacked_root: impl Into<PathBuf>) -> Self {
    Self {
      store,
      unpacked_root: unpacked_root.into(),
    }
  }

  pub fn unpacked_root(&self) -> &Path {
    &self.unpacked_root
  }

  pub fn unpacked_location(&self, name: &str) -> PathBuf {
    unpacked_location(&self.unpacked_root, name)
  }

  /// Unpack every node evaluated as cached. Returns how many were unpacked.
  pub fn unpack_available(&self, graph: &Graph) -> Result<usize, ExtractError> {
    let mut unpacked = 0;
    for node in graph.nodes().filter(|n| n.needs_rebuild() == Some(false)) {
      self.unpack(node)?;
      unpacked += 1;
    }
    if unpacked > 0 {
      info!(root = graph.root_node().name(), unpacked, "unpacked cached modules");
    }
    Ok(unpacked)
  }

  /// Replace the node's unpacked location with a fresh copy of its stored bundle.
  pub fn unpack(&self, node: &Node) -> Result<PathBuf, ExtractError> {
    let key = CacheKey::for_node(node).ok_or_else(|| ExtractError::MissingFingerprint {
      node: node.name().to_string(),
    })?;
    let bundle = self.store.retrieve(&key).map_err(|e| match e {
      StoreError::ArtifactMissing { key } => ExtractError::ArtifactMissing {
        node: node.name().to_string(),
        key,
      },
      other => other.into(),
    })?;

    let dest = self.unpacked_location(node.name());
    let unpack_err = |source| ExtractError::Unpack {
      path: dest.clone(),
      source,
    };
    reset_dir(&dest).map_err(unpack_err)?;
    copy_dir_contents(&bundle, &dest, &[]).map_err(unpack_err)?;

    match self.store.content_hash(&key)? {
      Some(expected) => {
        let actual = hash_directory(&dest, &[])?.0;
        if actual != expected {
          warn!(module = node.name(), key = %key, "cached bundle failed verification");
          remove_path(&dest).map_err(unpack_err)?;
          return Err(ExtractError::CorruptArtifact {
            node: node.name().to_string(),
            expected,
            actual,
          });
        }
      }
      None => debug!(module = node.name(), "store keeps no content hash, skipping verification"),
    }

    debug!(module = node.name(), path = %dest.display(), "unpacked module");
    Ok(dest)
  }
}
