//! Default locations for persisted settings
//!
//! Everything lives under the platform configuration directory
//! (`~/.config/recorder` on Linux, `~/Library/Application Support/recorder`
//! on macOS, `%APPDATA%\recorder` on Windows), so the adapter works the same
//! no matter which directory it is started from.

use std::path::PathBuf;
use tracing::{debug, warn};

const APP_DIR: &str = "recorder";

/// Configuration directory, not created on lookup
pub fn get_config_dir() -> PathBuf {
    let dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|parent| parent.join(APP_DIR))
        .unwrap_or_else(|| {
            warn!("Could not determine a configuration directory, using the temp dir");
            std::env::temp_dir().join(APP_DIR)
        });

    debug!("Config directory: {:?}", dir);
    dir
}

pub fn get_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

/// Per-scene monitored source table
pub fn get_bindings_path() -> PathBuf {
    get_config_dir().join("bindings.json")
}
