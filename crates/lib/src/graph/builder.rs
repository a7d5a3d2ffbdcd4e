use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info, trace};

use super::{Graph, GraphError, Node};
use crate::project::{ProjectError, ProjectModel, TargetFilter, TargetId};

/// Builds a [`Graph`] rooted at one module by walking declared dependencies.
pub struct GraphBuilder<'a> {
  project: &'a dyn ProjectModel,
}

struct Walk {
  dag: DiGraph<Node, ()>,
  by_name: HashMap<String, NodeIndex>,
  // Names on the current path from the root, for cycle reporting.
  path: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
  pub fn new(project: &'a dyn ProjectModel) -> Self {
    Self { project }
  }

  /// Only dependencies on the root's platform that are not test targets are followed.
  pub fn build_graph(&self, root_module: &str) -> Result<Graph, GraphError> {
    let root_id = self
      .project
      .find_target(root_module)
      .ok_or_else(|| GraphError::ModuleNotFound {
        name: root_module.to_string(),
        required_by: None,
      })?;
    let filter = TargetFilter::for_platform(&self.project.target(root_id)?.platform);
    debug!(root = root_module, platform = %filter.platform, "building dependency graph");

    let mut walk = Walk {
      dag: DiGraph::new(),
      by_name: HashMap::new(),
      path: Vec::new(),
    };
    let root = self.visit(root_id, &filter, &mut walk)?;

    info!(root = root_module, nodes = walk.dag.node_count(), "built dependency graph");
    Ok(Graph {
      root,
      dag: walk.dag,
      by_name: walk.by_name,
    })
  }

  fn visit(&self, id: TargetId, filter: &TargetFilter, walk: &mut Walk) -> Result<NodeIndex, GraphError> {
    let target = self.project.target(id)?;

    if let Some(start) = walk.path.iter().position(|name| *name == target.name) {
      let mut chain = walk.path[start..].to_vec();
      chain.push(target.name.clone());
      return Err(GraphError::CyclicDependency {
        chain: chain.join(" -> "),
      });
    }

    if let Some(&existing) = walk.by_name.get(&target.name) {
      trace!(module = %target.name, "reusing node");
      return Ok(existing);
    }

    let idx = walk
      .dag
      .add_node(Node::new(target.name.clone(), id, self.project.input_files(id)?));
    walk.by_name.insert(target.name.clone(), idx);
    walk.path.push(target.name.clone());

    let dependencies = self
      .project
      .resolve_dependencies(id, filter)
      .map_err(|e| match e {
        ProjectError::UnresolvedDependency { target, reference } => GraphError::ModuleNotFound {
          name: reference,
          required_by: Some(target),
        },
        other => other.into(),
      })?;
    for dependency in dependencies {
      let dep_idx = self.visit(dependency, filter, walk)?;
      walk.dag.update_edge(idx, dep_idx, ());
    }

    walk.path.pop();
    Ok(idx)
  }
}
