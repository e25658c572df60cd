use std::path::{Path, PathBuf};

use crate::app_constants::{CONFIG_FILE, DESKTOP_LOG_FILE};

/// Per-user data directory, laid out the way the platform's app-data
/// conventions expect (`~/Library/Application Support/<id>`,
/// `%APPDATA%\<id>`, `$XDG_DATA_HOME/<id>`).
pub fn default_data_dir(app_id: &str) -> Option<PathBuf> {
    platform_data_root().map(|root| root.join(app_id))
}

#[cfg(target_os = "macos")]
fn platform_data_root() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join("Library").join("Application Support"))
}

#[cfg(target_os = "windows")]
fn platform_data_root() -> Option<PathBuf> {
    std::env::var_os("APPDATA")
        .map(PathBuf::from)
        .or_else(|| home::home_dir().map(|home| home.join("AppData").join("Roaming")))
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_data_root() -> Option<PathBuf> {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .filter(|path| path.is_absolute())
        .or_else(|| home::home_dir().map(|home| home.join(".local").join("share")))
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

pub fn desktop_log_path(data_dir: &Path) -> PathBuf {
    log_dir(data_dir).join(DESKTOP_LOG_FILE)
}

pub fn tmp_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("tmp")
}
