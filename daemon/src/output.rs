/// Text-file output sinks for streaming software (e.g. OBS text sources).
///
/// Either one combined `output.txt` ("console: game") or separate `game.txt`
/// and `console.txt`, selected by `save_to_one_file`. Idle clears the files.
/// Write failures are logged and never interrupt the poller.
use std::path::{Path, PathBuf};

use crate::config::GeneralConfig;
use crate::state::CanonicalState;

pub const COMBINED_FILE: &str = "output.txt";
pub const GAME_FILE: &str = "game.txt";
pub const CONSOLE_FILE: &str = "console.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    Disabled,
    Combined,
    Split,
}

#[derive(Debug, Clone)]
pub struct OutputFiles {
    dir: PathBuf,
    mode: OutputMode,
}

impl OutputFiles {
    pub fn new(dir: PathBuf, mode: OutputMode) -> Self {
        Self { dir, mode }
    }

    pub fn from_config(general: &GeneralConfig, app_dir: &Path) -> Self {
        let mode = match (general.output_to_files, general.save_to_one_file) {
            (false, _) => OutputMode::Disabled,
            (true, true) => OutputMode::Combined,
            (true, false) => OutputMode::Split,
        };
        Self::new(general.save_dir(app_dir), mode)
    }

    /// Writes the committed state; an idle state clears the sinks.
    pub fn write(&self, state: &CanonicalState) {
        if state.is_idle() {
            self.clear();
            return;
        }
        match self.mode {
            OutputMode::Disabled => {}
            OutputMode::Combined => {
                self.write_file(COMBINED_FILE, &format!("{}: {}", state.console, state.game))
            }
            OutputMode::Split => {
                self.write_file(GAME_FILE, &state.game);
                self.write_file(CONSOLE_FILE, &state.console);
            }
        }
    }

    pub fn clear(&self) {
        match self.mode {
            OutputMode::Disabled => {}
            OutputMode::Combined => self.write_file(COMBINED_FILE, ""),
            OutputMode::Split => {
                self.write_file(GAME_FILE, "");
                self.write_file(CONSOLE_FILE, "");
            }
        }
    }

    fn write_file(&self, name: &str, content: &str) {
        let path = self.dir.join(name);
        match std::fs::write(&path, content) {
            Ok(()) => tracing::debug!("Wrote {:?} to {}", content, path.display()),
            Err(e) => tracing::warn!("Failed to write {}: {e}", path.display()),
        }
    }
}
