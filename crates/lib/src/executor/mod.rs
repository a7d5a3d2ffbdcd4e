//! The external build tool, behind a trait so the pipeline can run against fakes.

mod settings;
mod xcodebuild;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::project::BuildSettings;

pub use settings::{parse_build_settings, parse_load_command_uuids};
pub use xcodebuild::{DEFAULT_DESTINATION, XcodebuildExecutor};

/// Effective build settings of every target in one project, keyed by target name.
pub type SettingsSnapshot = BTreeMap<String, BuildSettings>;

#[derive(Debug, Error)]
pub enum ExecutorError {
  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command failed with exit code {code:?}: {command}")]
  CommandFailed { command: String, code: Option<i32> },

  #[error("build of '{target}' failed with exit code {code:?}")]
  BuildFailed { target: String, code: Option<i32> },

  #[error("no build settings in output for {project}")]
  NoSettings { project: PathBuf },
}

/// Everything the cache asks of the build tool.
#[allow(async_fn_in_trait)]
pub trait BuildExecutor {
  /// Query resolved settings for every target of `project_file`.
  async fn load_settings(&self, project_file: &Path, configuration: &str) -> Result<SettingsSnapshot, ExecutorError>;

  /// Build `target` and everything it depends on. Blocks until the build finishes.
  async fn build(
    &self,
    project_file: &Path,
    configuration: &str,
    target: &str,
    derived_data: &Path,
  ) -> Result<(), ExecutorError>;

  /// Build identifiers (UUIDs) recorded in a compiled binary.
  async fn list_build_identifiers(&self, binary: &Path) -> Result<Vec<String>, ExecutorError>;
}
