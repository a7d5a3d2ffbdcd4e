//! Rewires consuming targets to link cached modules as prebuilt products.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::extract::unpacked_location;
use crate::graph::{Graph, Node};
use crate::project::{ProductKind, ProjectError, ProjectModel, TargetFilter, TargetId};

pub const INHERITED: &str = "$(inherited)";
const FRAMEWORK_SEARCH_PATHS: &str = "FRAMEWORK_SEARCH_PATHS";
const LIBRARY_SEARCH_PATHS: &str = "LIBRARY_SEARCH_PATHS";
const OTHER_LDFLAGS: &str = "OTHER_LDFLAGS";

#[derive(Debug, Error)]
pub enum FixError {
  #[error("cannot link module '{node}' as prebuilt: unsupported product type {product_type}")]
  UnsupportedProduct { node: String, product_type: String },

  #[error(transparent)]
  Project(#[from] ProjectError),
}

/// Edits settings of one build configuration. Every edit is idempotent.
pub struct SettingsFixer {
  configuration: String,
  unpacked_root: PathBuf,
}

impl SettingsFixer {
  pub fn new(configuration: impl Into<String>, unpacked_root: impl Into<PathBuf>) -> Self {
    Self {
      configuration: configuration.into(),
      unpacked_root: unpacked_root.into(),
    }
  }

  /// Link every cached direct dependency of each module about to be rebuilt.
  /// Returns how many links were applied.
  pub fn fix(&self, project: &mut dyn ProjectModel, graph: &Graph) -> Result<usize, FixError> {
    let mut linked = 0;
    for idx in graph.rebuild_nodes() {
      let consumer = graph.node(idx).target();
      for dep_idx in graph.dependencies(idx) {
        let dep = graph.node(dep_idx);
        if dep.needs_rebuild() == Some(false) {
          self.add_as_prebuilt_framework(project, dep, consumer)?;
          linked += 1;
        }
      }
    }
    if linked > 0 {
      info!(root = graph.root_node().name(), linked, "linked cached modules into rebuilt targets");
    }
    Ok(linked)
  }

  /// Point `consumer` at the unpacked product of `node` and drop its source dependency on it.
  pub fn add_as_prebuilt_framework(
    &self,
    project: &mut dyn ProjectModel,
    node: &Node,
    consumer: TargetId,
  ) -> Result<(), FixError> {
    let target = project.target(node.target())?;
    let filter = TargetFilter::for_platform(target.platform.clone());
    let stem = target.product.stem();
    let (search_key, link_flags) = match target.product_kind() {
      ProductKind::Framework => (FRAMEWORK_SEARCH_PATHS, vec!["-framework".to_string(), stem]),
      ProductKind::SingleFile => {
        let library = stem.strip_prefix("lib").unwrap_or(&stem);
        (LIBRARY_SEARCH_PATHS, vec![format!("-l{library}")])
      }
      ProductKind::Unsupported(product_type) => {
        return Err(FixError::UnsupportedProduct {
          node: node.name().to_string(),
          product_type,
        });
      }
    };

    let location = quote(&unpacked_location(&self.unpacked_root, node.name()).display().to_string());
    self.append_setting(project, consumer, search_key, &[location])?;
    self.append_setting(project, consumer, OTHER_LDFLAGS, &link_flags)?;
    let removed = project.remove_dependencies_on(consumer, node.target(), &filter)?;

    debug!(
      module = node.name(),
      consumer = %project.target(consumer)?.name,
      removed_dependencies = removed,
      "linked as prebuilt"
    );
    Ok(())
  }

  fn append_setting(
    &self,
    project: &mut dyn ProjectModel,
    id: TargetId,
    key: &str,
    values: &[String],
  ) -> Result<(), FixError> {
    let current = project.setting(id, &self.configuration, key)?;
    let merged = merge_list_setting(current.as_deref(), values);
    if current.as_deref() != Some(merged.as_str()) {
      project.set_setting(id, &self.configuration, key, merged)?;
    }
    Ok(())
  }
}

/// Append `values` to a list-valued setting unless they already appear as a run.
///
/// An unset or empty setting starts from `$(inherited)`.
pub fn merge_list_setting(current: Option<&str>, values: &[String]) -> String {
  let mut tokens = split_list_setting(current.unwrap_or(""));
  if tokens.is_empty() {
    tokens.push(INHERITED.to_string());
  }
  let present = values.is_empty() || tokens.windows(values.len()).any(|run| run == values);
  if !present {
    tokens.extend(values.iter().cloned());
  }
  tokens.join(" ")
}

/// Split on whitespace, keeping double-quoted runs together.
fn split_list_setting(value: &str) -> Vec<String> {
  let mut tokens = Vec::new();
  let mut current = String::new();
  let mut quoted = false;
  for c in value.chars() {
    match c {
      '"' => {
        quoted = !quoted;
        current.push(c);
      }
      c if c.is_whitespace() && !quoted => {
        if !current.is_empty() {
          tokens.push(std::mem::take(&mut current));
        }
      }
      c => current.push(c),
    }
  }
  if !current.is_empty() {
    tokens.push(current);
  }
  tokens
}

fn quote(value: &str) -> String {
  if value.contains(char::is_whitespace) {
    format!("\"{value}\"")
  } else {
    value.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::GraphBuilder;
  use crate::project::Workspace;
  use crate::util::testutil::{framework, static_lib, with_deps, workspace};
  use std::path::Path;
  use tempfile::TempDir;

  const CONFIG: &str = "Release";

  fn setting(ws: &Workspace, target: &str, key: &str) -> Option<String> {
    ws.setting(ws.find_target(target).unwrap(), CONFIG, key).unwrap()
  }

  fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
  }

  #[test]
  fn framework_gets_search_path_and_link_flag() {
    let temp = TempDir::new().unwrap();
    let mut ws = workspace(temp.path(), vec![with_deps(framework("App"), &["Core"]), framework("Core")]);
    let graph = GraphBuilder::new(&ws).build_graph("App").unwrap();
    let fixer = SettingsFixer::new(CONFIG, "/derived/cached");

    let core = graph.node(graph.find("Core").unwrap());
    fixer
      .add_as_prebuilt_framework(&mut ws, core, graph.root_node().target())
      .unwrap();

    assert_eq!(
      setting(&ws, "App", "FRAMEWORK_SEARCH_PATHS").as_deref(),
      Some("$(inherited) /derived/cached/Core")
    );
    assert_eq!(
      setting(&ws, "App", "OTHER_LDFLAGS").as_deref(),
      Some("$(inherited) -framework Core")
    );
    assert!(ws.target(ws.find_target("App").unwrap()).unwrap().dependencies.is_empty());
  }

  #[test]
  fn other_platform_twin_does_not_keep_source_dependency() {
    let temp = TempDir::new().unwrap();
    let mut mac_core = framework("Core");
    mac_core.platform = "macos".to_string();
    let mut ws = workspace(
      temp.path(),
      vec![with_deps(framework("App"), &["Core"]), mac_core, framework("Core")],
    );
    let graph = GraphBuilder::new(&ws).build_graph("App").unwrap();
    let core = graph.node(graph.find("Core").unwrap());
    assert_eq!(ws.target(core.target()).unwrap().platform, "ios");

    SettingsFixer::new(CONFIG, "/derived/cached")
      .add_as_prebuilt_framework(&mut ws, core, graph.root_node().target())
      .unwrap();

    assert!(ws.target(ws.find_target("App").unwrap()).unwrap().dependencies.is_empty());
    assert_eq!(
      setting(&ws, "App", "OTHER_LDFLAGS").as_deref(),
      Some("$(inherited) -framework Core")
    );
  }

  #[test]
  fn static_library_links_by_short_name() {
    let temp = TempDir::new().unwrap();
    let mut ws = workspace(temp.path(), vec![with_deps(framework("App"), &["Logger"]), static_lib("Logger")]);
    let graph = GraphBuilder::new(&ws).build_graph("App").unwrap();
    let logger = graph.node(graph.find("Logger").unwrap());

    SettingsFixer::new(CONFIG, "/derived/cached")
      .add_as_prebuilt_framework(&mut ws, logger, graph.root_node().target())
      .unwrap();

    assert_eq!(
      setting(&ws, "App", "LIBRARY_SEARCH_PATHS").as_deref(),
      Some("$(inherited) /derived/cached/Logger")
    );
    assert_eq!(setting(&ws, "App", "OTHER_LDFLAGS").as_deref(), Some("$(inherited) -lLogger"));
    assert_eq!(setting(&ws, "App", "FRAMEWORK_SEARCH_PATHS"), None);
  }

  #[test]
  fn applying_twice_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let mut ws = workspace(temp.path(), vec![with_deps(framework("App"), &["Core"]), framework("Core")]);
    let graph = GraphBuilder::new(&ws).build_graph("App").unwrap();
    let fixer = SettingsFixer::new(CONFIG, temp.path().join("Derived Data/cached"));
    let core = graph.node(graph.find("Core").unwrap());
    let app = graph.root_node().target();

    fixer.add_as_prebuilt_framework(&mut ws, core, app).unwrap();
    let first = ws.target(app).unwrap().clone();
    fixer.add_as_prebuilt_framework(&mut ws, core, app).unwrap();

    assert_eq!(ws.target(app).unwrap(), &first);
    let search = setting(&ws, "App", "FRAMEWORK_SEARCH_PATHS").unwrap();
    assert!(search.ends_with("/Derived Data/cached/Core\""), "{search}");
  }

  #[test]
  fn existing_values_are_kept() {
    let merged = merge_list_setting(Some("$(inherited) -ObjC"), &strings(&["-framework", "Core"]));
    assert_eq!(merged, "$(inherited) -ObjC -framework Core");

    let again = merge_list_setting(Some(merged.as_str()), &strings(&["-framework", "Core"]));
    assert_eq!(again, merged);

    // A lone "-framework" elsewhere does not count as already linked.
    let other = merge_list_setting(Some("-framework Net"), &strings(&["-framework", "Core"]));
    assert_eq!(other, "-framework Net -framework Core");
  }

  #[test]
  fn quoted_entries_stay_whole() {
    assert_eq!(
      split_list_setting(r#"$(inherited) "/a b/c"  -ObjC"#),
      strings(&["$(inherited)", "\"/a b/c\"", "-ObjC"])
    );
  }

  #[test]
  fn fix_links_only_cached_dependencies_of_rebuilt_modules() {
    let temp = TempDir::new().unwrap();
    let mut ws = workspace(
      temp.path(),
      vec![
        with_deps(framework("App"), &["Core", "Net"]),
        with_deps(framework("Core"), &["Logger"]),
        framework("Net"),
        static_lib("Logger"),
      ],
    );
    let mut graph = GraphBuilder::new(&ws).build_graph("App").unwrap();
    for (name, rebuild) in [("App", true), ("Core", false), ("Net", true), ("Logger", false)] {
      let idx = graph.find(name).unwrap();
      graph.node_mut(idx).set_needs_rebuild(rebuild);
    }

    let linked = SettingsFixer::new(CONFIG, Path::new("/cached"))
      .fix(&mut ws, &graph)
      .unwrap();

    assert_eq!(linked, 1);
    assert_eq!(setting(&ws, "App", "OTHER_LDFLAGS").as_deref(), Some("$(inherited) -framework Core"));
    // Core is cached, so nothing is linked into it.
    assert_eq!(setting(&ws, "Core", "OTHER_LDFLAGS"), None);
    assert_eq!(setting(&ws, "Net", "OTHER_LDFLAGS"), None);
  }

  #[test]
  fn unsupported_product_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut bundle = framework("Resources");
    bundle.product_type = "com.apple.product-type.bundle".to_string();
    let mut ws = workspace(temp.path(), vec![with_deps(framework("App"), &["Resources"]), bundle]);
    let graph = GraphBuilder::new(&ws).build_graph("App").unwrap();
    let resources = graph.node(graph.find("Resources").unwrap());

    let err = SettingsFixer::new(CONFIG, "/cached")
      .add_as_prebuilt_framework(&mut ws, resources, graph.root_node().target())
      .unwrap_err();
    assert!(matches!(err, FixError::UnsupportedProduct { ref product_type, .. } if product_type == "com.apple.product-type.bundle"));
    assert_eq!(setting(&ws, "App", "FRAMEWORK_SEARCH_PATHS"), None);
  }
}
