//! Cache directory helpers

use std::path::PathBuf;

const APP_DIR: &str = "withdrawal-monitor";

/// Per-user cache directory for the monitor
///
/// Falls back to the working directory when the platform has no cache dir.
pub fn get_cache_path() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

/// Default location of the persisted token file
pub fn default_token_file() -> PathBuf {
    get_cache_path().join("tokens.json")
}
