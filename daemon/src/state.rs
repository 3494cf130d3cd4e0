use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::foreground::ForegroundResolver;
use crate::hub::BroadcastHub;
use crate::registry::GameRegistry;
use crate::scanner::ProcessScanner;
use crate::thumbnails::StagedThumbnails;

/// The single current (game, console) pair shared by every consumer.
///
/// Both fields are empty together (idle) or both non-empty (tracking).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalState {
    pub game: String,
    pub console: String,
}

impl CanonicalState {
    pub fn tracking(game: impl Into<String>, console: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            console: console.into(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.game.is_empty() && self.console.is_empty()
    }
}

/// Everything the poller and the websocket sessions share.
///
/// Lock discipline: `state` is written only by the poller; `registry` is held
/// for annotation and for client mutations, never across an await.
/// `store_writes` is held from a registry mutation until its store write has
/// finished, so writes land in mutation order.
pub struct AppContext {
    pub state: RwLock<CanonicalState>,
    pub registry: Mutex<GameRegistry>,
    pub store_writes: tokio::sync::Mutex<()>,
    pub hub: BroadcastHub,
    pub config: Arc<RwLock<Config>>,
    pub scanner: Arc<dyn ProcessScanner>,
    pub foreground: Arc<dyn ForegroundResolver>,
    pub staged: Mutex<StagedThumbnails>,
    pub app_dir: PathBuf,
}

impl AppContext {
    pub fn new(
        config: Arc<RwLock<Config>>,
        registry: GameRegistry,
        scanner: Arc<dyn ProcessScanner>,
        foreground: Arc<dyn ForegroundResolver>,
        staged: StagedThumbnails,
        app_dir: PathBuf,
    ) -> Self {
        Self {
            state: RwLock::new(CanonicalState::default()),
            registry: Mutex::new(registry),
            store_writes: tokio::sync::Mutex::new(()),
            hub: BroadcastHub::new(),
            config,
            scanner,
            foreground,
            staged: Mutex::new(staged),
            app_dir,
        }
    }

    /// Latest committed state. Never observes a tick that is still in progress.
    pub async fn current(&self) -> CanonicalState {
        self.state.read().await.clone()
    }
}
