/// Canonical file paths for TrackGame data files.
///
/// The app data directory is %APPDATA%\TrackGame on Windows and
/// $XDG_CONFIG_HOME/trackgame (or ~/.config/trackgame) elsewhere:
///   - config.toml  Read by the daemon, hot-reloaded on change.
///   - status.toml  Written by the daemon on every state change.
///
/// `games.json` and the output text files live in the save directory, which
/// defaults to the app data directory (see `GeneralConfig::save_dir`).
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME_WINDOWS: &str = "TrackGame";
const APP_DIR_NAME_UNIX: &str = "trackgame";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const TEMPLATES_FILE_NAME: &str = "games.json";

/// Returns the TrackGame application data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    if let Some(appdata) = std::env::var_os("APPDATA") {
        return Ok(PathBuf::from(appdata).join(APP_DIR_NAME_WINDOWS));
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join(APP_DIR_NAME_UNIX));
    }
    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".config").join(APP_DIR_NAME_UNIX));
    }
    bail!("none of APPDATA, XDG_CONFIG_HOME or HOME is set")
}

pub fn config_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(CONFIG_FILE_NAME)
}

pub fn status_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(STATUS_FILE_NAME)
}

pub fn templates_file_path(save_dir: &Path) -> PathBuf {
    save_dir.join(TEMPLATES_FILE_NAME)
}
