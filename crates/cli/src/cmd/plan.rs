//! Implementation of the `xcache plan` command.
//!
//! Reports, per cached dependency, which modules the store already holds.
//! Nothing is unpacked, built or written back to the project files.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use xcache_lib::config::RunConfig;
use xcache_lib::project::Workspace;
use xcache_lib::runner::Planner;
use xcache_lib::store::LocalStorage;

use crate::output::{OutputFormat, print_info, print_json, print_module, print_stat, symbols};

pub fn cmd_plan(config_path: &Path, cache_dir: Option<&Path>, output: OutputFormat) -> Result<()> {
  let config = RunConfig::load(config_path)
    .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
  let workspace = Workspace::open(&config.workspace)
    .with_context(|| format!("Failed to open workspace: {}", config.workspace.display()))?;
  let store = LocalStorage::new(config.store_dir(cache_dir));
  let executor = config.executor();
  debug!(store = %store.root().display(), workspace = %config.workspace.display(), "resolved locations");

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let planner = Planner::new(&config, &workspace, &executor, &store);
  let plans = rt.block_on(planner.plan())?;

  if output.is_json() {
    return print_json(&plans);
  }

  for plan in &plans {
    let misses = plan.modules.iter().filter(|m| !m.cached).count();
    println!();
    print_info(&format!("{} {} {}", plan.target, symbols::ARROW, plan.dependency));
    for module in &plan.modules {
      print_module(&module.name, &module.fingerprint, module.cached);
    }
    print_stat("Cached", &(plan.modules.len() - misses).to_string());
    print_stat("To rebuild", &misses.to_string());
  }

  Ok(())
}
