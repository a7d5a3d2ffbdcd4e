//! CLI output formatting utilities.
//!
//! Colored status lines, human-readable sizes and durations, and the JSON
//! output mode shared by every subcommand.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const TILDE: &str = "~";
}

/// Short form of a fingerprint for listings.
pub fn truncate_hash(hash: &str) -> &str {
  hash.get(..12).unwrap_or(hash)
}

pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KB", "MB", "GB"];

  let mut value = bytes as f64;
  let mut unit = None;
  for next in UNITS {
    if value < 1024.0 {
      break;
    }
    value /= 1024.0;
    unit = Some(next);
  }
  match unit {
    Some(unit) => format!("{:.1} {}", value, unit),
    None => format!("{} B", bytes),
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  match secs {
    60.. => format!("{}m {}s", secs / 60, secs % 60),
    1.. => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
    0 => format!("{}ms", duration.subsec_millis()),
  }
}

pub fn print_success(message: &str) {
  let symbol = symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green());
  println!("{} {}", symbol, message);
}

/// Errors go to stderr, fully colored.
pub fn print_error(message: &str) {
  let symbol = symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red());
  eprintln!("{} {}", symbol, message.if_supports_color(Stream::Stderr, |s| s.red()));
}

pub fn print_info(message: &str) {
  let symbol = symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue());
  println!("{} {}", symbol, message);
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// One module line of a plan: a check for cache hits, a tilde for rebuilds.
pub fn print_module(name: &str, fingerprint: &str, cached: bool) {
  let (marker, state) = if cached {
    (symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(), "cached")
  } else {
    (symbols::TILDE.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(), "rebuild")
  };
  let detail = format!("({} {})", truncate_hash(fingerprint), state);
  println!("  {} {} {}", marker, name, detail.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
  if count == 1 {
    format!("{} {}", count, singular)
  } else {
    format!("{} {}", count, plural)
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
