//! Content fingerprints for modules.
//!
//! A fingerprint is a SHA-256 over a canonical JSON payload holding the
//! module's location-independent build settings, the hashes of its input
//! files and the fingerprints of its direct dependencies. Any change below a
//! module therefore changes the module's own fingerprint.

use std::collections::BTreeMap;
use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::FINGERPRINT_VERSION;
use crate::graph::{Graph, GraphError};
use crate::util::hash::hash_file;

/// Settings that only describe where things live on this machine or who runs
/// the build. They never change what gets compiled.
const EXCLUDED_SETTINGS: &[&str] = &[
  "BUILD_DIR",
  "BUILD_ROOT",
  "BUILT_PRODUCTS_DIR",
  "CACHE_ROOT",
  "CCHROOT",
  "CONFIGURATION_BUILD_DIR",
  "CONFIGURATION_TEMP_DIR",
  "DERIVED_FILES_DIR",
  "DERIVED_FILE_DIR",
  "DERIVED_SOURCES_DIR",
  "DSTROOT",
  "GID",
  "GROUP",
  "HOME",
  "LOCROOT",
  "LOCSYMROOT",
  "LOGNAME",
  "OBJECT_FILE_DIR",
  "OBJROOT",
  "PODS_BUILD_DIR",
  "PODS_CONFIGURATION_BUILD_DIR",
  "PODS_ROOT",
  "PROJECT_DERIVED_FILE_DIR",
  "PROJECT_DIR",
  "PROJECT_FILE_PATH",
  "PROJECT_TEMP_DIR",
  "PROJECT_TEMP_ROOT",
  "SHARED_DERIVED_FILE_DIR",
  "SHARED_PRECOMPS_DIR",
  "SOURCE_ROOT",
  "SRCROOT",
  "SYMROOT",
  "TARGET_BUILD_DIR",
  "TARGET_TEMP_DIR",
  "TEMP_DIR",
  "TEMP_FILES_DIR",
  "TEMP_FILE_DIR",
  "TEMP_ROOT",
  "UID",
  "UNINSTALLED_PRODUCTS_DIR",
  "USER",
];

const MISSING_INPUT: &str = "missing";

/// Whether a setting contributes to fingerprints.
pub fn is_fingerprinted_setting(key: &str) -> bool {
  EXCLUDED_SETTINGS.binary_search(&key).is_err()
}

/// Lowercase hex SHA-256 identifying one exact build of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error)]
pub enum FingerprintError {
  #[error("no build settings loaded for module '{node}'")]
  MissingSettings { node: String },

  #[error("dependency '{dependency}' of '{node}' has no fingerprint yet")]
  DependencyPending { node: String, dependency: String },

  #[error("failed to serialize fingerprint payload: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error(transparent)]
  Graph(#[from] GraphError),
}

#[derive(Serialize)]
struct Payload<'a> {
  version: u32,
  settings: BTreeMap<&'a str, &'a str>,
  inputs: BTreeMap<&'a str, String>,
  dependencies: BTreeMap<&'a str, &'a str>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FingerprintCalculator;

impl FingerprintCalculator {
  pub fn new() -> Self {
    Self
  }

  /// Fingerprint one node whose dependencies are already fingerprinted.
  ///
  /// A node that already carries a fingerprint keeps it.
  pub fn calculate(&self, graph: &mut Graph, idx: NodeIndex) -> Result<Fingerprint, FingerprintError> {
    if let Some(existing) = graph.node(idx).fingerprint() {
      return Ok(existing.clone());
    }

    let fingerprint = {
      let node = graph.node(idx);
      let settings = node.settings().ok_or_else(|| FingerprintError::MissingSettings {
        node: node.name().to_string(),
      })?;

      let mut dependencies = BTreeMap::new();
      for dep_idx in graph.dependencies(idx) {
        let dep = graph.node(dep_idx);
        let dep_fingerprint = dep.fingerprint().ok_or_else(|| FingerprintError::DependencyPending {
          node: node.name().to_string(),
          dependency: dep.name().to_string(),
        })?;
        dependencies.insert(dep.name(), dep_fingerprint.as_str());
      }

      let inputs = node
        .inputs()
        .iter()
        .map(|input| {
          let digest = match hash_file(&input.path) {
            Ok(hash) => hash.0,
            Err(e) => {
              warn!(module = node.name(), input = %input.relative, error = %e, "input file unreadable");
              MISSING_INPUT.to_string()
            }
          };
          (input.relative.as_str(), digest)
        })
        .collect();

      let payload = Payload {
        version: FINGERPRINT_VERSION,
        settings: settings
          .iter()
          .filter(|(key, _)| is_fingerprinted_setting(key))
          .map(|(key, value)| (key.as_str(), value.as_str()))
          .collect(),
        inputs,
        dependencies,
      };

      let serialized = serde_json::to_string(&payload)?;
      let mut hasher = Sha256::new();
      hasher.update(serialized.as_bytes());
      Fingerprint(format!("{:x}", hasher.finalize()))
    };

    debug!(module = graph.node(idx).name(), fingerprint = %fingerprint, "calculated fingerprint");
    graph.node_mut(idx).set_fingerprint(fingerprint.clone());
    Ok(fingerprint)
  }

  /// Fingerprint every node, dependencies first.
  pub fn calculate_all(&self, graph: &mut Graph) -> Result<(), FingerprintError> {
    for idx in graph.bottom_up_order()? {
      self.calculate(graph, idx)?;
    }
    Ok(())
  }
}
