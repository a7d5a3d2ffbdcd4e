mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::{OutputFormat, print_error};
use xcache_lib::consts::DEFAULT_CONFIG_FILE;

/// xcache - prebuilt module cache for multi-project builds
#[derive(Parser)]
#[command(name = "xcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build or restore every configured cached dependency
  Run {
    /// Path to the run configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Artifact store directory (overrides env and config)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
  },

  /// Show which modules would come from the cache, without building
  Plan {
    /// Path to the run configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Artifact store directory (overrides env and config)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
  },

  /// Inspect or clean the artifact store
  Cache {
    #[command(subcommand)]
    command: CacheCommands,

    /// Run configuration consulted for `cache_dir` when present
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Artifact store directory (overrides env and config)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
  },
}

#[derive(Subcommand)]
enum CacheCommands {
  /// List stored entries
  List,
  /// Remove stored entries
  Clean {
    /// Only remove entries of this module
    #[arg(long)]
    module: Option<String>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Run { config, cache_dir } => cmd::cmd_run(&config, cache_dir.as_deref(), cli.output),
    Commands::Plan { config, cache_dir } => cmd::cmd_plan(&config, cache_dir.as_deref(), cli.output),
    Commands::Cache {
      command,
      config,
      cache_dir,
    } => match command {
      CacheCommands::List => cmd::cmd_cache_list(&config, cache_dir.as_deref(), cli.output),
      CacheCommands::Clean { module } => {
        cmd::cmd_cache_clean(&config, cache_dir.as_deref(), module.as_deref(), cli.output)
      }
    },
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
