//! Shared helpers for CLI integration tests.
//!
//! Each test gets a temp directory holding a one-project workspace, a run
//! config and a stand-in `xcodebuild` script, so the full pipeline runs
//! without a real toolchain.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

const SETTINGS_OUTPUT: &str = "Build settings for action archive and target Core:
    PRODUCT_NAME = Core
    SWIFT_OPTIMIZATION_LEVEL = -O
";

pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// App depends on the Core framework, which is the cached dependency.
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };

    env.write_file(
      "App.json",
      r#"{
  "targets": [
    {
      "name": "App",
      "platform": "ios",
      "product_type": "com.apple.product-type.application",
      "product": { "path": "App.app" },
      "dependencies": [{ "target": "Core" }]
    },
    {
      "name": "Core",
      "platform": "ios",
      "product_type": "com.apple.product-type.framework",
      "product": { "path": "Core.framework" },
      "inputs": ["Core/Core.swift"]
    }
  ]
}"#,
    );
    env.write_file("Core/Core.swift", "public struct Core {}\n");
    env.write_tool();

    let config = serde_json::json!({
      "workspace": "App.json",
      "configuration": "Release",
      "derived_data_path": "Derived",
      "cache_dir": "store",
      "tools": { "xcodebuild": env.root().join("xcodebuild").display().to_string() },
      "targets": [{ "name": "App", "cached_dependencies": ["Core"] }],
    });
    env.write_file("xcache.json", &serde_json::to_string_pretty(&config).unwrap());
    env
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn config_path(&self) -> PathBuf {
    self.root().join("xcache.json")
  }

  pub fn store_path(&self) -> PathBuf {
    self.root().join("store")
  }

  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.root().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// How many times the stand-in build tool was asked to build.
  pub fn build_count(&self) -> usize {
    std::fs::read_to_string(self.root().join("builds.log"))
      .map(|log| log.lines().count())
      .unwrap_or(0)
  }

  pub fn cmd(&self, subcommand: &str) -> Command {
    let mut cmd = cargo_bin_cmd!("xcache");
    cmd
      .env_remove("XCACHE_CACHE_DIR")
      .current_dir(self.root())
      .args(["-o", "json", subcommand, "-c"])
      .arg(self.config_path());
    cmd
  }

  pub fn project_json(&self) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(self.root().join("App.json")).unwrap()).unwrap()
  }

  /// Prints canned settings for `-showBuildSettings`; otherwise drops a
  /// Core.framework under the requested derived data path.
  fn write_tool(&self) {
    let log = self.root().join("builds.log");
    let script = format!(
      r#"#!/bin/sh
for arg in "$@"; do
  if [ "$arg" = "-showBuildSettings" ]; then
    cat <<'EOF'
{settings}EOF
    exit 0
  fi
done
derived=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-derivedDataPath" ]; then
    shift
    derived="$1"
  fi
  shift
done
out="$derived/Build/Products/Release-iphoneos/Core.framework"
mkdir -p "$out"
printf 'core binary' > "$out/Core"
echo build >> "{log}"
"#,
      settings = SETTINGS_OUTPUT,
      log = log.display()
    );
    let path = self.root().join("xcodebuild");
    std::fs::write(&path, script).unwrap();

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
  }
}
