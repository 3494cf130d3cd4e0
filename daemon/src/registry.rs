/// Game template registry: the set of applications the daemon knows how to
/// name, plus per-tick run-state annotations.
///
/// Templates are deduplicated on `(process_name, window_title)`. The registry
/// order is registration order and doubles as the tie-break order used by the
/// state detector, so the dedup keeps the slot of the first insertion while
/// taking the payload of the latest one.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::RegistryError;
use crate::scanner::ProcessEntry;

/// Executable name of the emulator whose history log names the game.
pub const EMULATOR_PROCESS: &str = "retroarch.exe";
/// `window_title` sentinel meaning "ask the history log".
pub const EMULATOR_SENTINEL: &str = "RetroArch";
/// Console reported for natively tracked applications.
pub const NATIVE_SYSTEM: &str = "Windows";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameTemplate {
    pub process_name: String,
    /// Expected caption; empty means "use whatever the OS reports".
    #[serde(default)]
    pub window_title: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub game: String,
    /// Relative path of the title-screen thumbnail under `thumbnails_path`.
    #[serde(default)]
    pub named_titles: String,
    #[serde(default)]
    pub named_boxarts: String,
    #[serde(skip)]
    pub pid: u32,
    #[serde(skip)]
    pub is_running: bool,
}

impl GameTemplate {
    pub fn new(
        process_name: impl Into<String>,
        window_title: impl Into<String>,
        system: impl Into<String>,
        game: impl Into<String>,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            window_title: window_title.into(),
            system: system.into(),
            game: game.into(),
            named_titles: String::new(),
            named_boxarts: String::new(),
            pid: 0,
            is_running: false,
        }
    }

    /// The synthetic template that defers naming to the history log.
    pub fn emulator() -> Self {
        Self::new(EMULATOR_PROCESS, EMULATOR_SENTINEL, "", "")
    }

    pub fn is_emulator(&self) -> bool {
        self.process_name.eq_ignore_ascii_case(EMULATOR_PROCESS)
            && self.window_title == EMULATOR_SENTINEL
    }

    /// Template for a user-registered native application.
    pub fn native(process_name: impl Into<String>, window_title: impl Into<String>) -> Self {
        let process_name = process_name.into();
        let game = display_name(&process_name);
        Self::new(process_name, window_title, NATIVE_SYSTEM, game)
    }

    pub fn dedup_key(&self) -> String {
        format!("{}|{}", self.process_name, self.window_title)
    }
}

/// "Game.exe" → "Game"; names without the suffix are returned unchanged.
pub fn display_name(process_name: &str) -> String {
    let name = process_name.trim();
    match name.len().checked_sub(4) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".exe") => {
            name[..cut].to_string()
        }
        _ => name.to_string(),
    }
}

/// Folds `templates` by dedup key. Later payloads overwrite earlier ones; the
/// surviving entry stays at the position of the key's first occurrence.
pub fn dedup(templates: Vec<GameTemplate>) -> Vec<GameTemplate> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<GameTemplate> = Vec::with_capacity(templates.len());
    for t in templates {
        match slots.get(&t.dedup_key()) {
            Some(&i) => out[i] = t,
            None => {
                slots.insert(t.dedup_key(), out.len());
                out.push(t);
            }
        }
    }
    out
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// `games.json`: a pretty-printed JSON array of templates.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the store, creating an empty one if the file does not exist.
    pub fn load(&self) -> Result<Vec<GameTemplate>> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&self.path, "[]")
                .with_context(|| format!("Failed to create {}", self.path.display()))?;
            tracing::info!("Created empty template store {}", self.path.display());
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    pub fn save(&self, templates: &[GameTemplate]) -> Result<()> {
        let content = serde_json::to_string_pretty(templates)
            .context("Failed to serialize templates")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// A registry snapshot waiting to be written; detached from the registry lock
/// so the write can run on a blocking thread.
pub struct PendingSave {
    store: TemplateStore,
    templates: Vec<GameTemplate>,
}

impl PendingSave {
    pub fn write(self) -> Result<(), RegistryError> {
        self.store.save(&self.templates)?;
        Ok(())
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

pub struct GameRegistry {
    templates: Vec<GameTemplate>,
    store: Option<TemplateStore>,
}

impl GameRegistry {
    /// In-memory registry seeded with `templates` and the emulator template.
    pub fn in_memory(templates: Vec<GameTemplate>) -> Self {
        let mut registry = Self {
            templates,
            store: None,
        };
        registry.normalize();
        registry
    }

    /// Loads the registry from `store`, adds the emulator template and dedups.
    pub fn load(store: TemplateStore) -> Result<Self> {
        let templates = store.load()?;
        let mut registry = Self {
            templates,
            store: Some(store),
        };
        registry.normalize();
        tracing::info!(
            "Loaded {} game templates from {}",
            registry.templates.len(),
            registry.store.as_ref().map(|s| s.path().display().to_string()).unwrap_or_default()
        );
        Ok(registry)
    }

    /// Like [`GameRegistry::load`], but an unreadable store yields a registry
    /// holding only the emulator template. The store file is left as it is
    /// until the next mutation rewrites it.
    pub fn load_or_empty(store: TemplateStore) -> Self {
        match Self::load(store.clone()) {
            Ok(registry) => registry,
            Err(e) => {
                tracing::error!("Error loading game templates: {e:#}");
                let mut registry = Self {
                    templates: Vec::new(),
                    store: Some(store),
                };
                registry.normalize();
                registry
            }
        }
    }

    pub fn templates(&self) -> &[GameTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Marks every template whose process is in `snapshot` as running.
    /// Names match case-insensitively; the first matching entry supplies the pid.
    pub fn annotate(&mut self, snapshot: &[ProcessEntry]) {
        for t in &mut self.templates {
            match snapshot
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(&t.process_name))
            {
                Some(p) => {
                    t.pid = p.pid;
                    t.is_running = true;
                }
                None => {
                    t.pid = 0;
                    t.is_running = false;
                }
            }
        }
    }

    /// Checks that `template` may be registered at all.
    pub fn validate(template: &GameTemplate) -> Result<(), RegistryError> {
        if template.process_name.trim().is_empty() {
            return Err(RegistryError::EmptyProcessName);
        }
        if template.process_name.eq_ignore_ascii_case(EMULATOR_PROCESS) {
            return Err(RegistryError::EmulatorReserved(template.process_name.clone()));
        }
        Ok(())
    }

    /// Adds `template` and dedups. The store is written separately through
    /// [`GameRegistry::pending_save`].
    pub fn register(&mut self, template: GameTemplate) -> Result<(), RegistryError> {
        Self::validate(&template)?;
        tracing::info!(
            "Registering template {} ({:?})",
            template.process_name,
            template.window_title
        );
        self.templates.push(template);
        self.normalize();
        Ok(())
    }

    /// Removes every template for `process_name` except the emulator template.
    /// Returns how many were removed.
    pub fn remove(&mut self, process_name: &str) -> usize {
        let before = self.templates.len();
        self.templates
            .retain(|t| t.is_emulator() || !t.process_name.eq_ignore_ascii_case(process_name));
        let removed = before - self.templates.len();
        if removed > 0 {
            tracing::info!("Removed {removed} template(s) for {process_name}");
        }
        self.normalize();
        removed
    }

    /// Snapshot of the current list for the backing store; `None` for
    /// in-memory registries.
    pub fn pending_save(&self) -> Option<PendingSave> {
        self.store.as_ref().map(|store| PendingSave {
            store: store.clone(),
            templates: self.templates.clone(),
        })
    }

    fn normalize(&mut self) {
        if !self.templates.iter().any(GameTemplate::is_emulator) {
            self.templates.push(GameTemplate::emulator());
        }
        self.templates = dedup(std::mem::take(&mut self.templates));
    }
}
