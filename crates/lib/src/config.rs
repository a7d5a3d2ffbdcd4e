//! Run configuration loaded from `xcache.json`.
//!
//! ```json
//! {
//!   "workspace": "App.workspace.json",
//!   "configuration": "Release",
//!   "derived_data_path": "build/DerivedData",
//!   "cache_dir": "/ci/xcache",
//!   "targets": [{ "name": "App", "cached_dependencies": ["Pods-App"] }]
//! }
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::UNPACKED_DIR_NAME;
use crate::executor::{DEFAULT_DESTINATION, XcodebuildExecutor};
use crate::platform::paths::{default_store_dir, store_dir_override};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid config {path}: {message}")]
  Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
  pub workspace: PathBuf,
  pub configuration: String,
  pub derived_data_path: PathBuf,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cache_dir: Option<PathBuf>,
  #[serde(default = "default_destination")]
  pub destination: String,
  #[serde(default)]
  pub tools: ToolsConfig,
  pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
  pub xcodebuild: String,
  pub otool: String,
}

impl Default for ToolsConfig {
  fn default() -> Self {
    Self {
      xcodebuild: "xcodebuild".to_string(),
      otool: "otool".to_string(),
    }
  }
}

/// A target whose listed dependencies should come from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
  pub name: String,
  #[serde(default)]
  pub cached_dependencies: Vec<String>,
}

fn default_destination() -> String {
  DEFAULT_DESTINATION.to_string()
}

impl RunConfig {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Self::parse(&content, path, &base)
  }

  /// Parse config text. `origin` only labels errors; `base` anchors relative paths.
  pub fn parse(content: &str, origin: &Path, base: &Path) -> Result<Self, ConfigError> {
    let mut config: RunConfig = serde_json::from_str(content).map_err(|source| ConfigError::Parse {
      path: origin.to_path_buf(),
      source,
    })?;
    config.resolve_paths(base);
    config.validate(origin)?;
    Ok(config)
  }

  fn resolve_paths(&mut self, base: &Path) {
    let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base.join(p) };
    self.workspace = resolve(&self.workspace);
    self.derived_data_path = resolve(&self.derived_data_path);
    self.cache_dir = self.cache_dir.as_deref().map(resolve);
  }

  fn validate(&self, origin: &Path) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::Invalid {
      path: origin.to_path_buf(),
      message: message.to_string(),
    };
    if self.configuration.trim().is_empty() {
      return Err(invalid("configuration must not be empty"));
    }
    if self.targets.is_empty() {
      return Err(invalid("at least one target is required"));
    }
    if self.targets.iter().any(|t| t.name.trim().is_empty()) {
      return Err(invalid("target names must not be empty"));
    }
    Ok(())
  }

  /// Where unpacked cached modules go during a run.
  pub fn unpacked_dir(&self) -> PathBuf {
    self.derived_data_path.join(UNPACKED_DIR_NAME)
  }

  /// Store location: CLI override, then `XCACHE_CACHE_DIR`, then config, then the platform cache dir.
  pub fn store_dir(&self, cli_override: Option<&Path>) -> PathBuf {
    cli_override
      .map(Path::to_path_buf)
      .or_else(store_dir_override)
      .or_else(|| self.cache_dir.clone())
      .unwrap_or_else(default_store_dir)
  }

  pub fn executor(&self) -> XcodebuildExecutor {
    XcodebuildExecutor::new()
      .with_xcodebuild(&self.tools.xcodebuild)
      .with_otool(&self.tools.otool)
      .with_destination(&self.destination)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consts::CACHE_DIR_ENV;
  use serial_test::serial;
  use tempfile::TempDir;

  const MINIMAL: &str = r#"{
    "workspace": "App.workspace.json",
    "configuration": "Release",
    "derived_data_path": "build/Derived",
    "targets": [{ "name": "App", "cached_dependencies": ["Pods-App"] }]
  }"#;

  fn parse(content: &str) -> Result<RunConfig, ConfigError> {
    RunConfig::parse(content, Path::new("xcache.json"), Path::new("/repo"))
  }

  #[test]
  fn relative_paths_resolve_against_config_dir() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("xcache.json");
    fs::write(&path, MINIMAL).unwrap();

    let config = RunConfig::load(&path).unwrap();
    assert_eq!(config.workspace, temp.path().join("App.workspace.json"));
    assert_eq!(config.derived_data_path, temp.path().join("build/Derived"));
    assert_eq!(config.unpacked_dir(), temp.path().join("build/Derived/cached"));
  }

  #[test]
  fn defaults_fill_optional_fields() {
    let config = parse(MINIMAL).unwrap();
    assert_eq!(config.destination, "generic/platform=iOS");
    assert_eq!(config.tools, ToolsConfig::default());
    assert_eq!(config.cache_dir, None);
    assert_eq!(config.targets[0].cached_dependencies, vec!["Pods-App"]);
  }

  #[test]
  fn absolute_paths_are_kept() {
    let config = parse(
      r#"{"workspace": "/abs/W.json", "configuration": "Debug", "derived_data_path": "/abs/D",
          "cache_dir": "cache", "targets": [{"name": "App"}]}"#,
    )
    .unwrap();
    assert_eq!(config.workspace, PathBuf::from("/abs/W.json"));
    assert_eq!(config.cache_dir, Some(PathBuf::from("/repo/cache")));
    assert!(config.targets[0].cached_dependencies.is_empty());
  }

  #[test]
  fn unknown_fields_are_rejected() {
    let err = parse(r#"{"workspace": "W", "configuration": "R", "derived_data_path": "D", "targets": [], "extra": 1}"#)
      .unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn empty_values_are_invalid() {
    let err = parse(r#"{"workspace": "W", "configuration": " ", "derived_data_path": "D", "targets": [{"name": "A"}]}"#)
      .unwrap_err();
    assert!(err.to_string().contains("configuration must not be empty"));

    let err = parse(r#"{"workspace": "W", "configuration": "R", "derived_data_path": "D", "targets": []}"#)
      .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
  }

  #[test]
  fn missing_file_is_a_read_error() {
    let err = RunConfig::load(Path::new("/nonexistent/xcache.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }

  #[test]
  #[serial]
  #[cfg(not(windows))]
  fn store_dir_precedence() {
    let mut config = parse(MINIMAL).unwrap();
    config.cache_dir = Some(PathBuf::from("/from/config"));

    temp_env::with_vars(
      [(CACHE_DIR_ENV, Some("/from/env")), ("XDG_CACHE_HOME", Some("/xdg"))],
      || {
        assert_eq!(config.store_dir(Some(Path::new("/from/cli"))), PathBuf::from("/from/cli"));
        assert_eq!(config.store_dir(None), PathBuf::from("/from/env"));
      },
    );
    temp_env::with_vars(
      [(CACHE_DIR_ENV, None::<&str>), ("XDG_CACHE_HOME", Some("/xdg"))],
      || {
        assert_eq!(config.store_dir(None), PathBuf::from("/from/config"));
        let mut bare = config.clone();
        bare.cache_dir = None;
        assert_eq!(bare.store_dir(None), PathBuf::from("/xdg/xcache/store"));
      },
    );
  }
}
