use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::state::CanonicalState;

/// Current tracking state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// No tracked process is running.
    Idle,
    /// A tracked process (or the emulator) is running and has been resolved.
    Tracking,
}

/// Runtime status written by the daemon to `<app dir>/status.toml`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: DaemonState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<String>,
    /// RFC 3339 timestamp of the last committed change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            game: None,
            console: None,
            last_change: None,
        }
    }

    /// Folds a committed canonical state into the status.
    pub fn apply(&mut self, state: &CanonicalState, timestamp: String) {
        if state.is_idle() {
            self.state = DaemonState::Idle;
            self.game = None;
            self.console = None;
        } else {
            self.state = DaemonState::Tracking;
            self.game = Some(state.game.clone());
            self.console = Some(state.console.clone());
        }
        self.last_change = Some(timestamp);
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// A status write failure is logged and never stops the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create status directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::warn!("Failed to write status file: {e}");
            }
        }
        Err(e) => tracing::warn!("Failed to serialize status: {e}"),
    }
}
