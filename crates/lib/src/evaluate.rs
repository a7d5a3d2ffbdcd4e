//! Decides, per module, whether a cached artifact can be reused.

use tracing::{debug, info};

use crate::graph::{Graph, Node};
use crate::store::{ArtifactStore, CacheKey};

#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
  #[error("module '{node}' has no fingerprint")]
  MissingFingerprint { node: String },
}

pub struct RebuildEvaluator<'a> {
  store: &'a dyn ArtifactStore,
}

impl<'a> RebuildEvaluator<'a> {
  pub fn new(store: &'a dyn ArtifactStore) -> Self {
    Self { store }
  }

  /// Flag `node` for rebuild when the store has nothing under its fingerprint.
  pub fn evaluate(&self, node: &mut Node) -> Result<bool, EvaluateError> {
    let key = CacheKey::for_node(node).ok_or_else(|| EvaluateError::MissingFingerprint {
      node: node.name().to_string(),
    })?;
    let needs_rebuild = !self.store.exists(&key);
    debug!(module = node.name(), key = %key, needs_rebuild, "evaluated module");
    node.set_needs_rebuild(needs_rebuild);
    Ok(needs_rebuild)
  }

  /// Evaluate every node. Returns how many need a rebuild.
  pub fn evaluate_all(&self, graph: &mut Graph) -> Result<usize, EvaluateError> {
    let mut rebuilds = 0;
    for idx in graph.node_indices().collect::<Vec<_>>() {
      if self.evaluate(graph.node_mut(idx))? {
        rebuilds += 1;
      }
    }
    info!(
      root = graph.root_node().name(),
      modules = graph.len(),
      rebuilds,
      "evaluated cache state"
    );
    Ok(rebuilds)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fingerprint::FingerprintCalculator;
  use crate::graph::GraphBuilder;
  use crate::store::LocalStorage;
  use crate::util::testutil::{fill_settings, framework, static_lib, with_deps, workspace};
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn flags_only_modules_missing_from_store() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(
      temp.path(),
      vec![with_deps(framework("App"), &["Logger"]), static_lib("Logger")],
    );
    let mut graph = GraphBuilder::new(&ws).build_graph("App").unwrap();
    fill_settings(&mut graph);
    FingerprintCalculator::new().calculate_all(&mut graph).unwrap();

    let store = LocalStorage::new(temp.path().join("store"));
    let logger = graph.node(graph.find("Logger").unwrap());
    let bundle = temp.path().join("bundle");
    fs::create_dir_all(&bundle).unwrap();
    fs::write(bundle.join("libLogger.a"), "lib").unwrap();
    store.store(&CacheKey::for_node(logger).unwrap(), &bundle).unwrap();

    let rebuilds = RebuildEvaluator::new(&store).evaluate_all(&mut graph).unwrap();

    assert_eq!(rebuilds, 1);
    assert_eq!(graph.node(graph.find("Logger").unwrap()).needs_rebuild(), Some(false));
    assert_eq!(graph.root_node().needs_rebuild(), Some(true));
    assert!(graph.needs_any_rebuild());
    assert_eq!(graph.rebuild_nodes(), vec![graph.root()]);
  }

  #[test]
  fn unfingerprinted_node_is_an_error() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(temp.path(), vec![framework("Core")]);
    let mut graph = GraphBuilder::new(&ws).build_graph("Core").unwrap();
    let store = LocalStorage::new(temp.path().join("store"));

    let err = RebuildEvaluator::new(&store).evaluate_all(&mut graph).unwrap_err();
    assert!(matches!(err, EvaluateError::MissingFingerprint { ref node } if node == "Core"));
  }
}
