//! Names and versions shared across the cache.

pub const APP_NAME: &str = "xcache";

/// Marker file written into every published store entry, beside its bundle.
pub const ENTRY_MARKER: &str = ".xcache-entry.json";

/// Directory inside a store entry holding exactly the stored files.
pub const BUNDLE_DIR_NAME: &str = "bundle";

/// Directory under the derived-data path holding unpacked cached modules.
pub const UNPACKED_DIR_NAME: &str = "cached";

/// Bump whenever the fingerprint payload changes shape.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "xcache.json";

/// Environment variable overriding the artifact store location.
pub const CACHE_DIR_ENV: &str = "XCACHE_CACHE_DIR";

/// Prefix of in-flight staging directories inside the store.
pub const STAGING_PREFIX: &str = ".staging-";
