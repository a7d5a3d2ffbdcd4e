//! End-to-end runs against the stand-in build tool.

#![cfg(unix)]

use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn cold_run_builds_and_stores_dependency() {
  let env = TestEnv::new();

  env
    .cmd("run")
    .assert()
    .success()
    .stdout(predicate::str::contains("\"rebuilt\": 1").and(predicate::str::contains("\"builds\": 1")));

  assert_eq!(env.build_count(), 1);
  let module_dir = env.store_path().join("Core");
  let entries: Vec<_> = std::fs::read_dir(&module_dir).unwrap().flatten().collect();
  assert_eq!(entries.len(), 1);
  assert!(entries[0].path().join("bundle/Core.framework/Core").is_file());
}

#[test]
fn cold_run_links_consumer_against_product() {
  let env = TestEnv::new();

  env.cmd("run").assert().success();

  let project = env.project_json();
  let app = &project["targets"][0];
  assert_eq!(app["name"], "App");
  assert!(app.get("dependencies").is_none());
  let flags = app["settings"]["Release"]["OTHER_LDFLAGS"].as_str().unwrap();
  assert!(flags.contains("-framework Core"));
  let search = app["settings"]["Release"]["FRAMEWORK_SEARCH_PATHS"].as_str().unwrap();
  assert!(search.contains("Derived/cached/Core"));
}

#[test]
fn warm_run_restores_without_building() {
  let env = TestEnv::new();
  env.cmd("run").assert().success();
  std::fs::remove_dir_all(env.root().join("Derived")).unwrap();

  env
    .cmd("run")
    .assert()
    .success()
    .stdout(predicate::str::contains("\"cache_hits\": 1").and(predicate::str::contains("\"builds\": 0")));

  assert_eq!(env.build_count(), 1);
  let binary = env.root().join("Derived/cached/Core/Core.framework/Core");
  assert_eq!(std::fs::read_to_string(binary).unwrap(), "core binary");
}

#[test]
fn source_edit_forces_rebuild() {
  let env = TestEnv::new();
  env.cmd("run").assert().success();

  env.write_file("Core/Core.swift", "public struct Core { let x = 1 }\n");
  env
    .cmd("run")
    .assert()
    .success()
    .stdout(predicate::str::contains("\"rebuilt\": 1"));

  assert_eq!(env.build_count(), 2);
  assert_eq!(std::fs::read_dir(env.store_path().join("Core")).unwrap().count(), 2);
}

#[test]
fn plan_reports_state_without_building() {
  let env = TestEnv::new();

  env
    .cmd("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("\"cached\": false"));
  assert_eq!(env.build_count(), 0);
  assert!(!env.root().join("Derived").exists());

  env.cmd("run").assert().success();
  env
    .cmd("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("\"cached\": true"));
}

#[test]
fn failing_build_stores_nothing() {
  let env = TestEnv::new();
  env.write_file(
    "xcodebuild-broken",
    "#!/bin/sh\ncase \"$*\" in *-showBuildSettings*) printf 'Build settings for action archive and target Core:\\n    PRODUCT_NAME = Core\\n' ;; *) exit 65 ;; esac\n",
  );
  {
    use std::os::unix::fs::PermissionsExt;
    let path = env.root().join("xcodebuild-broken");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  }
  let mut config: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(env.config_path()).unwrap()).unwrap();
  config["tools"]["xcodebuild"] = env.root().join("xcodebuild-broken").display().to_string().into();
  env.write_file("xcache.json", &config.to_string());

  env
    .cmd("run")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Core"));

  assert!(!env.store_path().join("Core").exists());
}
