//! Read/write view of the project files the cache operates on.
//!
//! The cache never parses a vendor project format directly. It talks to a
//! [`ProjectModel`], and [`Workspace`] implements it over JSON project files
//! that mirror the parts of a native project the cache needs: targets, their
//! products, dependency declarations, source inputs and editable settings.

mod types;
mod workspace;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use types::*;
pub use workspace::{ProjectFile, Workspace, WorkspaceFile};

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("unknown target id {0}")]
  UnknownTarget(TargetId),

  #[error("dependency '{reference}' of target '{target}' does not resolve to any target")]
  UnresolvedDependency { target: String, reference: String },

  #[error("nested project '{reference}' of {parent} was not loaded")]
  UnknownProject { parent: PathBuf, reference: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize {path}: {source}")]
  Serialize {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Operations the cache needs from a loaded set of project files.
///
/// All target handles stay valid for the lifetime of the model; edits only
/// touch settings and dependency declarations, never the target list.
pub trait ProjectModel {
  /// Find a target by target name or product file name across every loaded project.
  fn find_target(&self, name: &str) -> Option<TargetId>;

  fn target(&self, id: TargetId) -> Result<&Target, ProjectError>;

  /// Resolve a target's declared dependencies, in declaration order.
  ///
  /// Declarations pointing only at targets rejected by `filter` are dropped.
  /// Declarations matching nothing at all fail with `UnresolvedDependency`.
  fn resolve_dependencies(&self, id: TargetId, filter: &TargetFilter) -> Result<Vec<TargetId>, ProjectError>;

  /// The file handed to the build tool to build or query this target.
  fn build_file(&self, id: TargetId) -> Result<PathBuf, ProjectError>;

  fn input_files(&self, id: TargetId) -> Result<Vec<InputFile>, ProjectError>;

  fn setting(&self, id: TargetId, configuration: &str, key: &str) -> Result<Option<String>, ProjectError>;

  fn set_setting(&mut self, id: TargetId, configuration: &str, key: &str, value: String) -> Result<(), ProjectError>;

  /// Drop every declaration on `id` that resolves to `dependency` under `filter`,
  /// the same way `resolve_dependencies` picks it. Returns how many were removed.
  fn remove_dependencies_on(
    &mut self,
    id: TargetId,
    dependency: TargetId,
    filter: &TargetFilter,
  ) -> Result<usize, ProjectError>;

  /// Persist edited project files.
  fn save(&mut self) -> Result<(), ProjectError>;
}
