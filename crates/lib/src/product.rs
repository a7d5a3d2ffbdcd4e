//! Finds the files a module's build produced inside the derived-data tree.
//!
//! A framework contributes its bundle, its debug-symbol bundle when present
//! and, for bitcode builds, the symbol maps named after the binary's build
//! identifiers. A static or dynamic library contributes its single file.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::executor::{BuildExecutor, ExecutorError};
use crate::graph::Node;
use crate::project::{ProductKind, ProjectError, ProjectModel};

#[derive(Debug, Error)]
pub enum LocateError {
  #[error("module '{node}' has unsupported product type {product_type}")]
  UnsupportedProduct { node: String, product_type: String },

  #[error("product {product} of module '{node}' not found under derived data")]
  ProductNotFound { node: String, product: String },

  #[error("failed to resolve {path}: {source}")]
  Canonicalize {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Executor(#[from] ExecutorError),

  #[error(transparent)]
  Project(#[from] ProjectError),
}

pub struct ProductLocator<'a, E: BuildExecutor> {
  derived_data: PathBuf,
  skip: Vec<PathBuf>,
  executor: &'a E,
}

impl<'a, E: BuildExecutor> ProductLocator<'a, E> {
  pub fn new(derived_data: impl Into<PathBuf>, executor: &'a E) -> Self {
    Self {
      derived_data: derived_data.into(),
      skip: Vec::new(),
      executor,
    }
  }

  /// Leave a subtree out of the search, e.g. the unpacked cache inside derived data.
  pub fn skipping(mut self, path: impl Into<PathBuf>) -> Self {
    self.skip.push(path.into());
    self
  }

  /// Absolute, symlink-resolved paths of every product file of `node`.
  pub async fn list_product_contents(
    &self,
    project: &dyn ProjectModel,
    node: &Node,
  ) -> Result<Vec<PathBuf>, LocateError> {
    let target = project.target(node.target())?;
    let product_name = target.product.file_name();
    let binary_name = target.product.stem();

    let candidates = match target.product_kind() {
      ProductKind::Framework => self.framework_contents(node, &product_name, &binary_name).await?,
      ProductKind::SingleFile => vec![self.require(node, &product_name)?],
      ProductKind::Unsupported(product_type) => {
        return Err(LocateError::UnsupportedProduct {
          node: node.name().to_string(),
          product_type,
        });
      }
    };

    let mut files = Vec::with_capacity(candidates.len());
    for path in candidates.into_iter().filter(|p| p.exists()) {
      let resolved = dunce::canonicalize(&path).map_err(|source| LocateError::Canonicalize { path, source })?;
      if !files.contains(&resolved) {
        files.push(resolved);
      }
    }
    debug!(module = node.name(), files = files.len(), "located products");
    Ok(files)
  }

  async fn framework_contents(
    &self,
    node: &Node,
    product_name: &str,
    binary_name: &str,
  ) -> Result<Vec<PathBuf>, LocateError> {
    let framework = self.require(node, product_name)?;
    let mut files = vec![framework.clone()];

    let dsym_name = node
      .setting("DWARF_DSYM_FILE_NAME")
      .map(str::to_string)
      .unwrap_or_else(|| format!("{product_name}.dSYM"));
    match self.find_first(&dsym_name) {
      Some(dsym) => files.push(dsym),
      None => debug!(module = node.name(), dsym = %dsym_name, "no debug symbols found"),
    }

    let binary = framework.join(binary_name);
    if !binary.exists() {
      return Err(LocateError::ProductNotFound {
        node: node.name().to_string(),
        product: binary.display().to_string(),
      });
    }

    if bitcode_enabled(node) {
      for uuid in self.executor.list_build_identifiers(&binary).await? {
        let map_name = format!("{uuid}.bcsymbolmap");
        match self.find_first(&map_name) {
          Some(map) => files.push(map),
          None => warn!(module = node.name(), symbol_map = %map_name, "symbol map missing"),
        }
      }
    }

    Ok(files)
  }

  fn require(&self, node: &Node, file_name: &str) -> Result<PathBuf, LocateError> {
    self.find_first(file_name).ok_or_else(|| LocateError::ProductNotFound {
      node: node.name().to_string(),
      product: file_name.to_string(),
    })
  }

  /// First entry named `file_name` below derived data, in sorted walk order.
  fn find_first(&self, file_name: &str) -> Option<PathBuf> {
    WalkDir::new(&self.derived_data)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|e| !self.is_skipped(e.path()))
      .filter_map(Result::ok)
      .find(|e| e.depth() > 0 && e.file_name().to_str() == Some(file_name))
      .map(|e| e.into_path())
  }

  fn is_skipped(&self, path: &Path) -> bool {
    self.skip.iter().any(|skip| path.starts_with(skip))
  }
}

fn bitcode_enabled(node: &Node) -> bool {
  node
    .setting("ENABLE_BITCODE")
    .is_some_and(|v| v.eq_ignore_ascii_case("YES"))
}
