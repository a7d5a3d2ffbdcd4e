//! Implementation of the `xcache run` command.
//!
//! Loads the run configuration and workspace, then drives the runner over
//! every configured target and cached dependency.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use xcache_lib::config::RunConfig;
use xcache_lib::project::Workspace;
use xcache_lib::runner::Runner;
use xcache_lib::store::LocalStorage;

use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_success};

pub fn cmd_run(config_path: &Path, cache_dir: Option<&Path>, output: OutputFormat) -> Result<()> {
  let start = Instant::now();

  let config = RunConfig::load(config_path)
    .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
  let mut workspace = Workspace::open(&config.workspace)
    .with_context(|| format!("Failed to open workspace: {}", config.workspace.display()))?;
  let store = LocalStorage::new(config.store_dir(cache_dir));
  let executor = config.executor();
  debug!(store = %store.root().display(), workspace = %config.workspace.display(), "resolved locations");

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt.block_on(Runner::new(&config, &mut workspace, &executor, &store).run())?;

  if output.is_json() {
    print_json(&summary)?;
  } else {
    println!();
    print_success("Run complete");
    print_stat("Dependencies", &summary.dependencies.to_string());
    print_stat("Modules", &summary.modules.to_string());
    print_stat("Cache hits", &summary.cache_hits.to_string());
    print_stat("Rebuilt", &summary.rebuilt.to_string());
    print_stat("Builds", &summary.builds.to_string());
    print_stat("Store", &store.root().display().to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
