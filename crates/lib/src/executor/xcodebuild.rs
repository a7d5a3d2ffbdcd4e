use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::settings::{parse_build_settings, parse_load_command_uuids};
use super::{BuildExecutor, ExecutorError, SettingsSnapshot};

pub const DEFAULT_DESTINATION: &str = "generic/platform=iOS";

/// Drives `xcodebuild` and `otool` as child processes.
#[derive(Debug, Clone)]
pub struct XcodebuildExecutor {
  xcodebuild: String,
  otool: String,
  destination: String,
}

impl Default for XcodebuildExecutor {
  fn default() -> Self {
    Self {
      xcodebuild: "xcodebuild".to_string(),
      otool: "otool".to_string(),
      destination: DEFAULT_DESTINATION.to_string(),
    }
  }
}

impl XcodebuildExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_xcodebuild(mut self, program: impl Into<String>) -> Self {
    self.xcodebuild = program.into();
    self
  }

  pub fn with_otool(mut self, program: impl Into<String>) -> Self {
    self.otool = program.into();
    self
  }

  pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
    self.destination = destination.into();
    self
  }

  fn project_args(&self, project_file: &Path, configuration: &str) -> Vec<String> {
    vec![
      "-project".to_string(),
      project_file.display().to_string(),
      "-configuration".to_string(),
      configuration.to_string(),
      "-destination".to_string(),
      self.destination.clone(),
    ]
  }

  /// Run a tool to completion and hand back its stdout.
  async fn capture(&self, program: &str, args: &[String]) -> Result<String, ExecutorError> {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!(command = %command_line, "spawning process");

    let output = Command::new(program)
      .args(args)
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|source| ExecutorError::Spawn {
        program: program.to_string(),
        source,
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }
      return Err(ExecutorError::CommandFailed {
        command: command_line,
        code: output.status.code(),
      });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

impl BuildExecutor for XcodebuildExecutor {
  async fn load_settings(&self, project_file: &Path, configuration: &str) -> Result<SettingsSnapshot, ExecutorError> {
    let mut args = self.project_args(project_file, configuration);
    args.extend(["-alltargets", "-showBuildSettings", "archive"].map(String::from));

    let output = self.capture(&self.xcodebuild, &args).await?;
    let snapshot = parse_build_settings(&output);
    if snapshot.is_empty() {
      return Err(ExecutorError::NoSettings {
        project: project_file.to_path_buf(),
      });
    }
    debug!(project = %project_file.display(), targets = snapshot.len(), "loaded build settings");
    Ok(snapshot)
  }

  async fn build(
    &self,
    project_file: &Path,
    configuration: &str,
    target: &str,
    derived_data: &Path,
  ) -> Result<(), ExecutorError> {
    let mut args = self.project_args(project_file, configuration);
    args.extend([
      "-target".to_string(),
      target.to_string(),
      "-derivedDataPath".to_string(),
      derived_data.display().to_string(),
      "build".to_string(),
    ]);
    info!(module = target, project = %project_file.display(), "building");

    // Build logs go straight to the terminal; they can run to megabytes.
    let status = Command::new(&self.xcodebuild)
      .args(&args)
      .stdin(Stdio::null())
      .status()
      .await
      .map_err(|source| ExecutorError::Spawn {
        program: self.xcodebuild.clone(),
        source,
      })?;

    if !status.success() {
      return Err(ExecutorError::BuildFailed {
        target: target.to_string(),
        code: status.code(),
      });
    }
    Ok(())
  }

  async fn list_build_identifiers(&self, binary: &Path) -> Result<Vec<String>, ExecutorError> {
    let output = self
      .capture(&self.otool, &["-l".to_string(), binary.display().to_string()])
      .await?;
    Ok(parse_load_command_uuids(&output))
  }
}
