//! Dependency graph of the modules behind one cached dependency.
//!
//! Nodes are unique by module name. Edges point from a dependent to its
//! dependency, so a reversed topological sort yields dependencies first.

mod builder;

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::project::{BuildSettings, InputFile, ProjectError, TargetId};

pub use builder::GraphBuilder;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("module '{name}' not found in the project model{}", required_by_suffix(.required_by))]
  ModuleNotFound { name: String, required_by: Option<String> },

  #[error("cyclic dependency: {chain}")]
  CyclicDependency { chain: String },

  #[error(transparent)]
  Project(#[from] ProjectError),
}

fn required_by_suffix(required_by: &Option<String>) -> String {
  required_by
    .as_ref()
    .map(|module| format!(" (required by '{module}')"))
    .unwrap_or_default()
}

/// One module. Settings, fingerprint and rebuild flag are filled in by later
/// pipeline stages, each exactly once.
#[derive(Debug, Clone)]
pub struct Node {
  name: String,
  target: TargetId,
  inputs: Vec<InputFile>,
  settings: Option<BuildSettings>,
  fingerprint: Option<Fingerprint>,
  needs_rebuild: Option<bool>,
}

impl Node {
  pub(crate) fn new(name: String, target: TargetId, inputs: Vec<InputFile>) -> Self {
    Self {
      name,
      target,
      inputs,
      settings: None,
      fingerprint: None,
      needs_rebuild: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn target(&self) -> TargetId {
    self.target
  }

  pub fn inputs(&self) -> &[InputFile] {
    &self.inputs
  }

  pub fn settings(&self) -> Option<&BuildSettings> {
    self.settings.as_ref()
  }

  pub fn setting(&self, key: &str) -> Option<&str> {
    self.settings.as_ref().and_then(|s| s.get(key)).map(String::as_str)
  }

  pub fn fingerprint(&self) -> Option<&Fingerprint> {
    self.fingerprint.as_ref()
  }

  pub fn needs_rebuild(&self) -> Option<bool> {
    self.needs_rebuild
  }

  pub(crate) fn set_settings(&mut self, settings: BuildSettings) {
    self.settings = Some(settings);
  }

  pub(crate) fn set_fingerprint(&mut self, fingerprint: Fingerprint) {
    self.fingerprint = Some(fingerprint);
  }

  pub(crate) fn set_needs_rebuild(&mut self, needs_rebuild: bool) {
    self.needs_rebuild = Some(needs_rebuild);
  }
}

#[derive(Debug)]
pub struct Graph {
  root: NodeIndex,
  dag: DiGraph<Node, ()>,
  by_name: HashMap<String, NodeIndex>,
}

impl Graph {
  pub fn root(&self) -> NodeIndex {
    self.root
  }

  pub fn root_node(&self) -> &Node {
    &self.dag[self.root]
  }

  pub fn node(&self, idx: NodeIndex) -> &Node {
    &self.dag[idx]
  }

  pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
    &mut self.dag[idx]
  }

  pub fn find(&self, name: &str) -> Option<NodeIndex> {
    self.by_name.get(name).copied()
  }

  pub fn len(&self) -> usize {
    self.dag.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.dag.node_count() == 0
  }

  /// Node indices in discovery order, root first.
  pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
    self.dag.node_indices()
  }

  pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
    self.dag.node_weights()
  }

  /// Direct dependencies of `idx` in declaration order.
  pub fn dependencies(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    // petgraph walks adjacency lists newest edge first.
    let mut deps: Vec<NodeIndex> = self.dag.neighbors_directed(idx, Direction::Outgoing).collect();
    deps.reverse();
    deps
  }

  /// Every node with each dependency before all of its dependents.
  pub fn bottom_up_order(&self) -> Result<Vec<NodeIndex>, GraphError> {
    let mut order = toposort(&self.dag, None).map_err(|cycle| GraphError::CyclicDependency {
      chain: self.dag[cycle.node_id()].name.clone(),
    })?;
    order.reverse();
    Ok(order)
  }

  pub fn needs_any_rebuild(&self) -> bool {
    self.nodes().any(|n| n.needs_rebuild == Some(true))
  }

  /// Nodes flagged for rebuild, in discovery order.
  pub fn rebuild_nodes(&self) -> Vec<NodeIndex> {
    self
      .node_indices()
      .filter(|&idx| self.dag[idx].needs_rebuild == Some(true))
      .collect()
  }
}
