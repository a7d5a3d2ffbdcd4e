//! Fixtures shared by the crate's unit tests: target builders, a one-file
//! workspace and a scripted build executor.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::executor::{BuildExecutor, ExecutorError, SettingsSnapshot};
use crate::graph::Graph;
use crate::project::{
  BuildSettings, DependencyRef, FRAMEWORK_PRODUCT_TYPE, ProductReference, ProjectFile, STATIC_LIBRARY_PRODUCT_TYPE,
  Target, Workspace,
};

fn target(name: &str, product_type: &str, product: String) -> Target {
  Target {
    name: name.to_string(),
    platform: "ios".to_string(),
    product_type: product_type.to_string(),
    product: ProductReference::from_path(&product),
    dependencies: vec![],
    inputs: vec![],
    settings: BTreeMap::new(),
  }
}

/// An iOS framework target producing `<name>.framework`.
pub fn framework(name: &str) -> Target {
  target(name, FRAMEWORK_PRODUCT_TYPE, format!("{name}.framework"))
}

/// An iOS static library target producing `lib<name>.a`.
pub fn static_lib(name: &str) -> Target {
  target(name, STATIC_LIBRARY_PRODUCT_TYPE, format!("lib{name}.a"))
}

pub fn with_deps(mut target: Target, deps: &[&str]) -> Target {
  target.dependencies.extend(deps.iter().map(|d| DependencyRef::Target {
    target: d.to_string(),
    project: None,
  }));
  target
}

pub fn with_inputs(mut target: Target, inputs: &[&str]) -> Target {
  target.inputs.extend(inputs.iter().map(|i| i.to_string()));
  target
}

pub fn settings(pairs: &[(&str, &str)]) -> BuildSettings {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// A workspace holding a single project file at `<dir>/App.json`.
pub fn workspace(dir: &Path, targets: Vec<Target>) -> Workspace {
  Workspace::from_projects(vec![(
    dir.join("App.json"),
    ProjectFile {
      targets,
      ..Default::default()
    },
  )])
  .unwrap()
}

/// Give every node a minimal settings map so it can be fingerprinted.
pub fn fill_settings(graph: &mut Graph) {
  for idx in graph.node_indices().collect::<Vec<_>>() {
    let name = graph.node(idx).name().to_string();
    graph.node_mut(idx).set_settings(settings(&[("PRODUCT_NAME", name.as_str())]));
  }
}

/// Scripted stand-in for the build tool.
///
/// `build` materializes the configured products under
/// `<derived data>/Build/Products` so the locator can find them.
#[derive(Debug, Default)]
pub struct FakeExecutor {
  settings: SettingsSnapshot,
  identifiers: Vec<String>,
  products: Vec<String>,
  fail_build: bool,
  builds: Mutex<Vec<String>>,
  settings_queries: AtomicUsize,
  identifier_queries: AtomicUsize,
}

impl FakeExecutor {
  pub fn with_settings(mut self, target: &str, pairs: &[(&str, &str)]) -> Self {
    self.settings.insert(target.to_string(), settings(pairs));
    self
  }

  pub fn with_identifiers(mut self, ids: &[&str]) -> Self {
    self.identifiers = ids.iter().map(|s| s.to_string()).collect();
    self
  }

  pub fn with_products(mut self, products: &[&str]) -> Self {
    self.products = products.iter().map(|s| s.to_string()).collect();
    self
  }

  pub fn failing_build(mut self) -> Self {
    self.fail_build = true;
    self
  }

  pub fn builds(&self) -> Vec<String> {
    self.builds.lock().unwrap().clone()
  }

  pub fn settings_queries(&self) -> usize {
    self.settings_queries.load(Ordering::SeqCst)
  }

  pub fn identifier_queries(&self) -> usize {
    self.identifier_queries.load(Ordering::SeqCst)
  }

  fn write_products(&self, derived_data: &Path) {
    let products = derived_data.join("Build/Products/Release-iphoneos");
    for product in &self.products {
      let path: PathBuf = products.join(product);
      if let Some(binary) = product.strip_suffix(".framework") {
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(binary), format!("{binary} binary")).unwrap();
      } else {
        fs::create_dir_all(&products).unwrap();
        fs::write(&path, format!("{product} contents")).unwrap();
      }
    }
  }
}

impl BuildExecutor for FakeExecutor {
  async fn load_settings(&self, _project_file: &Path, _configuration: &str) -> Result<SettingsSnapshot, ExecutorError> {
    self.settings_queries.fetch_add(1, Ordering::SeqCst);
    Ok(self.settings.clone())
  }

  async fn build(
    &self,
    _project_file: &Path,
    _configuration: &str,
    target: &str,
    derived_data: &Path,
  ) -> Result<(), ExecutorError> {
    self.builds.lock().unwrap().push(target.to_string());
    if self.fail_build {
      return Err(ExecutorError::BuildFailed {
        target: target.to_string(),
        code: Some(65),
      });
    }
    self.write_products(derived_data);
    Ok(())
  }

  async fn list_build_identifiers(&self, _binary: &Path) -> Result<Vec<String>, ExecutorError> {
    self.identifier_queries.fetch_add(1, Ordering::SeqCst);
    Ok(self.identifiers.clone())
  }
}
