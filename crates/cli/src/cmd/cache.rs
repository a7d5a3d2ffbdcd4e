//! Store maintenance: `xcache cache list` and `xcache cache clean`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use xcache_lib::config::RunConfig;
use xcache_lib::platform::paths::{default_store_dir, store_dir_override};
use xcache_lib::store::LocalStorage;

use crate::output::{
  OutputFormat, format_bytes, pluralize, print_info, print_json, print_stat, print_success, symbols, truncate_hash,
};

/// The store named by the flag, env var, config file (if one exists) or platform default.
fn resolve_store(config_path: &Path, cache_dir: Option<&Path>) -> Result<LocalStorage> {
  let root: PathBuf = if config_path.is_file() {
    RunConfig::load(config_path)
      .with_context(|| format!("Failed to load config: {}", config_path.display()))?
      .store_dir(cache_dir)
  } else {
    cache_dir
      .map(Path::to_path_buf)
      .or_else(store_dir_override)
      .unwrap_or_else(default_store_dir)
  };
  Ok(LocalStorage::new(root))
}

pub fn cmd_cache_list(config_path: &Path, cache_dir: Option<&Path>, output: OutputFormat) -> Result<()> {
  let store = resolve_store(config_path, cache_dir)?;
  let entries = store.entries().context("Failed to list store entries")?;

  if output.is_json() {
    return print_json(&entries);
  }

  if entries.is_empty() {
    print_info(&format!("No cached modules in {}", store.root().display()));
    return Ok(());
  }

  for entry in &entries {
    println!(
      "  {} {} {} ({})",
      symbols::INFO,
      entry.name,
      truncate_hash(&entry.fingerprint),
      format_bytes(entry.size_bytes)
    );
  }
  println!();
  print_stat("Entries", &entries.len().to_string());
  print_stat("Total size", &format_bytes(entries.iter().map(|e| e.size_bytes).sum()));
  print_stat("Store", &store.root().display().to_string());

  Ok(())
}

pub fn cmd_cache_clean(
  config_path: &Path,
  cache_dir: Option<&Path>,
  module: Option<&str>,
  output: OutputFormat,
) -> Result<()> {
  let store = resolve_store(config_path, cache_dir)?;
  let removed = match module {
    Some(name) => store
      .remove(name)
      .with_context(|| format!("Failed to remove cached module: {}", name))?,
    None => store.clear().context("Failed to clear store")?,
  };

  if output.is_json() {
    print_json(&serde_json::json!({ "removed": removed, "store": store.root() }))?;
  } else {
    print_success(&format!("Removed {}", pluralize(removed, "cached entry", "cached entries")));
  }

  Ok(())
}
