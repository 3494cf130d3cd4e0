use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::event::DaemonEvent;

pub const DEFAULT_RETROARCH_PATH: &str = r"C:\RetroArch-Win64";
pub const DEFAULT_WEB_PORT: u16 = 3489;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_OS_CALL_TIMEOUT_MS: u64 = 2_000;
pub const MAX_SYSTEM_ICON: u8 = 2;

/// File name of the emulator's history log inside `retroarch_path`.
pub const HISTORY_LOG_NAME: &str = "content_history.lpl";

/// Root configuration structure. Deserialized from `<app dir>/config.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    /// Console name → icon file shown on the `system` and `all` screens.
    #[serde(default)]
    pub systems: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// RetroArch install directory; `content_history.lpl` is read from here.
    #[serde(default = "default_retroarch_path")]
    pub retroarch_path: String,
    /// Directory for output text files and `games.json`. Empty = app data dir.
    #[serde(default)]
    pub save_path: String,
    /// Write `output.txt` ("console: game") instead of `game.txt` + `console.txt`.
    #[serde(default)]
    pub save_to_one_file: bool,
    #[serde(default = "default_true")]
    pub output_to_files: bool,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound on a single blocking OS call; expiry skips the tick.
    #[serde(default = "default_os_call_timeout")]
    pub os_call_timeout_ms: u64,
    /// 0 disables console icons; 1 and 2 are display variants left to the client.
    #[serde(default)]
    pub system_icon: u8,
    #[serde(default)]
    pub thumbnails_path: String,
    #[serde(default)]
    pub enable_thumbnails: bool,
    /// "WxH", "W x", "xH" or "0".
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            retroarch_path: default_retroarch_path(),
            save_path: String::new(),
            save_to_one_file: false,
            output_to_files: true,
            web_port: DEFAULT_WEB_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            os_call_timeout_ms: DEFAULT_OS_CALL_TIMEOUT_MS,
            system_icon: 0,
            thumbnails_path: String::new(),
            enable_thumbnails: false,
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

impl GeneralConfig {
    /// Polling period, clamped to [`MIN_POLL_INTERVAL_MS`, `MAX_POLL_INTERVAL_MS`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }

    pub fn os_call_timeout(&self) -> Duration {
        Duration::from_millis(self.os_call_timeout_ms.max(1))
    }

    /// Full path of the emulator history log.
    pub fn history_log_path(&self) -> PathBuf {
        Path::new(&self.retroarch_path).join(HISTORY_LOG_NAME)
    }

    /// Directory for output files and the template store, falling back to `app_dir`.
    pub fn save_dir(&self, app_dir: &Path) -> PathBuf {
        if self.save_path.trim().is_empty() {
            app_dir.to_path_buf()
        } else {
            PathBuf::from(&self.save_path)
        }
    }
}

impl Config {
    /// Icon file configured for `console`, or "" when icons are disabled or unmapped.
    pub fn icon_for(&self, console: &str) -> String {
        if self.general.system_icon == 0 || self.general.system_icon > MAX_SYSTEM_ICON {
            return String::new();
        }
        self.systems.get(console).cloned().unwrap_or_default()
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Watches the parent directory of `path`. Whenever the config file is created
/// or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("Failed to create config watcher: {e}");
            return;
        }
    };

    // Watch the directory so editor-style atomic saves (write-new + rename) are seen.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            tracing::error!("Config path {} has no parent directory", path.display());
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        tracing::error!("Failed to watch config directory {}: {e}", watch_dir.display());
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Failed to reload config: {e:#}"),
            }
        }
    }
}

fn default_retroarch_path() -> String {
    DEFAULT_RETROARCH_PATH.to_string()
}

fn default_true() -> bool {
    true
}

fn default_web_port() -> u16 {
    DEFAULT_WEB_PORT
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_os_call_timeout() -> u64 {
    DEFAULT_OS_CALL_TIMEOUT_MS
}

fn default_thumbnail_size() -> String {
    "0".to_string()
}
