use super::SettingsSnapshot;

const SECTION_PREFIX: &str = "Build settings for action ";
const TARGET_MARKER: &str = " and target ";

/// Parse `-showBuildSettings` output into per-target settings.
///
/// Sections start with `Build settings for action <action> and target <name>:`
/// and hold indented `KEY = value` lines. Anything outside a section is ignored.
pub fn parse_build_settings(output: &str) -> SettingsSnapshot {
  let mut snapshot = SettingsSnapshot::new();
  let mut current: Option<String> = None;

  for line in output.lines() {
    let trimmed = line.trim();
    if let Some(header) = trimmed.strip_prefix(SECTION_PREFIX) {
      current = header
        .split_once(TARGET_MARKER)
        .map(|(_, target)| target.trim_end_matches(':').trim().to_string());
      if let Some(target) = &current {
        snapshot.entry(target.clone()).or_default();
      }
      continue;
    }

    let Some(target) = &current else { continue };
    let Some((key, value)) = trimmed.split_once('=') else {
      continue;
    };
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
      continue;
    }
    if let Some(settings) = snapshot.get_mut(target) {
      settings.insert(key.to_string(), value.trim().to_string());
    }
  }

  snapshot
}

/// Extract `uuid` load commands from `otool -l` output, one per architecture slice.
pub fn parse_load_command_uuids(output: &str) -> Vec<String> {
  let mut uuids = Vec::new();
  for line in output.lines() {
    let mut words = line.split_whitespace();
    if words.next() == Some("uuid")
      && let Some(uuid) = words.next()
      && !uuids.iter().any(|u| u == uuid)
    {
      uuids.push(uuid.to_string());
    }
  }
  uuids
}
