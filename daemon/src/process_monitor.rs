use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::Config;
use crate::detector::{native_state, needs_focus, pick_winner, StateChangeDetector};
use crate::error::TickError;
use crate::event::DaemonEvent;
use crate::output::OutputFiles;
use crate::playlist::PlaylistParser;
use crate::registry::GameTemplate;
use crate::state::{AppContext, CanonicalState};
use crate::thumbnails;

/// Screens that receive an update on every game change.
pub const SCREEN_GAME: &str = "game";
pub const SCREEN_SYSTEM: &str = "system";
pub const SCREEN_ALL: &str = "all";
pub const SCREEN_THUMBNAILS: &str = "thumbnails";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Unchanged,
    Committed { notified: bool },
}

/// The polling task: scan → annotate → focus → resolve → commit → publish.
///
/// Every OS call runs on the blocking pool under `os_call_timeout_ms`. Any
/// failure or timeout skips the tick and leaves the committed state alone.
pub struct Poller {
    ctx: Arc<AppContext>,
    parser: Arc<dyn PlaylistParser>,
    detector: StateChangeDetector,
    events: mpsc::Sender<DaemonEvent>,
}

impl Poller {
    pub fn new(
        ctx: Arc<AppContext>,
        parser: Arc<dyn PlaylistParser>,
        events: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        Self {
            ctx,
            parser,
            detector: StateChangeDetector::new(),
            events,
        }
    }

    /// Ticks every `poll_interval_ms` until `shutdown` flips or its sender drops.
    /// A changed interval from a config reload takes effect on the next tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut period = self.ctx.config.read().await.general.poll_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Poller started ({} ms period)", period.as_millis());

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            match self.tick().await {
                Ok(TickOutcome::Unchanged) => tracing::trace!("Tick: no change"),
                Ok(TickOutcome::Committed { notified }) => {
                    tracing::debug!("Tick committed (notified: {notified})")
                }
                Err(e) => tracing::warn!("Skipping tick: {e}"),
            }

            let configured = self.ctx.config.read().await.general.poll_interval();
            if configured != period {
                tracing::info!("Poll period changed to {} ms", configured.as_millis());
                period = configured;
                ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick of a fresh interval fires immediately.
                ticker.tick().await;
            }
        }
        tracing::info!("Poller stopped");
    }

    /// One serial pass over the pipeline.
    pub async fn tick(&mut self) -> Result<TickOutcome, TickError> {
        let (limit, history_path) = {
            let cfg = self.ctx.config.read().await;
            (cfg.general.os_call_timeout(), cfg.general.history_log_path())
        };

        let scanner = Arc::clone(&self.ctx.scanner);
        let snapshot = off_thread("process scan", limit, move || scanner.snapshot()).await??;

        let running: Vec<GameTemplate> = {
            let mut registry = self.ctx.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.annotate(&snapshot);
            registry
                .templates()
                .iter()
                .filter(|t| t.is_running)
                .cloned()
                .collect()
        };

        let focused = if needs_focus(&running) {
            let foreground = Arc::clone(&self.ctx.foreground);
            Some(off_thread("foreground query", limit, move || foreground.foreground_pid()).await??)
        } else {
            None
        };

        let next = match pick_winner(&running, focused) {
            None => CanonicalState::default(),
            Some(winner) if winner.is_emulator() => {
                let parser = Arc::clone(&self.parser);
                let entry =
                    off_thread("history log read", limit, move || parser.latest_entry(&history_path))
                        .await??;
                CanonicalState::tracking(entry.game, entry.console)
            }
            Some(winner) => {
                let os_title = if winner.window_title.trim().is_empty() {
                    let foreground = Arc::clone(&self.ctx.foreground);
                    let pid = winner.pid;
                    match off_thread("window title", limit, move || foreground.window_title(pid))
                        .await?
                    {
                        Ok(title) => Some(title),
                        Err(e) => {
                            tracing::debug!("No caption for {}: {e}", winner.process_name);
                            None
                        }
                    }
                } else {
                    None
                };
                native_state(winner, os_title.as_deref())
            }
        };

        Ok(self.apply(next).await)
    }

    async fn apply(&mut self, next: CanonicalState) -> TickOutcome {
        let transition = self.detector.observe(next);
        let outputs = {
            let cfg = self.ctx.config.read().await;
            OutputFiles::from_config(&cfg.general, &self.ctx.app_dir)
        };

        if transition.clear_sinks {
            outputs.clear();
        }
        if !transition.commit {
            return TickOutcome::Unchanged;
        }

        *self.ctx.state.write().await = transition.state.clone();
        if transition.state.is_idle() {
            tracing::info!("Idle");
        } else {
            tracing::info!(
                "Now playing {:?} on {:?}",
                transition.state.game,
                transition.state.console
            );
            outputs.write(&transition.state);
        }

        if transition.notify {
            publish_state(&self.ctx, &transition.state).await;
        }
        if self
            .events
            .send(DaemonEvent::StateCommitted(transition.state))
            .await
            .is_err()
        {
            tracing::debug!("Event loop gone; state change not recorded");
        }
        TickOutcome::Committed {
            notified: transition.notify,
        }
    }
}

/// Runs `f` on the blocking pool, bounded by `limit`.
async fn off_thread<T, F>(what: &'static str, limit: Duration, f: F) -> Result<T, TickError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TickError::Join(what, e.to_string())),
        Err(_) => Err(TickError::TimedOut(what, limit.as_millis())),
    }
}

// ── Publishing ────────────────────────────────────────────────────────────────

/// Payload for each screen, in publish order.
pub fn screen_payloads(config: &Config, state: &CanonicalState) -> Vec<(&'static str, Value)> {
    let icon = config.icon_for(&state.console);
    let thumbs = thumbnails::resolve(&config.general, &state.console, &state.game);
    vec![
        (SCREEN_GAME, json!({ "game": state.game })),
        (SCREEN_SYSTEM, json!({ "console": state.console, "icon": icon })),
        (
            SCREEN_ALL,
            json!({ "console": state.console, "game": state.game, "icon": icon }),
        ),
        (
            SCREEN_THUMBNAILS,
            json!({
                "game": state.game,
                "paths": thumbs.paths,
                "width": thumbs.width,
                "height": thumbs.height,
            }),
        ),
    ]
}

/// One publish per screen for a newly committed state.
pub async fn publish_state(ctx: &AppContext, state: &CanonicalState) {
    let payloads = {
        let cfg = ctx.config.read().await;
        screen_payloads(&cfg, state)
    };
    for (screen, payload) in payloads {
        let delivered = ctx.hub.publish(screen, &payload).await;
        tracing::debug!("Published {screen} update to {delivered} client(s)");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeForeground, FakeParser, FakeScanner};
    use super::*;
    use crate::hub::testing::RecordingSink;
    use crate::output::{CONSOLE_FILE, GAME_FILE};
    use crate::registry::GameRegistry;
    use crate::thumbnails::StagedThumbnails;
    use tokio::sync::RwLock;

    struct Harness {
        poller: Poller,
        ctx: Arc<AppContext>,
        scanner: Arc<FakeScanner>,
        foreground: Arc<FakeForeground>,
        parser: Arc<FakeParser>,
        events: mpsc::Receiver<DaemonEvent>,
        dir: tempfile::TempDir,
    }

    fn harness(templates: Vec<GameTemplate>, parser: FakeParser) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Arc::new(FakeScanner::with(&[]));
        let foreground = Arc::new(FakeForeground::default());
        let ctx = Arc::new(AppContext::new(
            Arc::new(RwLock::new(Config::default())),
            GameRegistry::in_memory(templates),
            scanner.clone(),
            foreground.clone(),
            StagedThumbnails::new(dir.path().join("staging")),
            dir.path().to_path_buf(),
        ));
        let parser = Arc::new(parser);
        let (tx, rx) = mpsc::channel(16);
        Harness {
            poller: Poller::new(Arc::clone(&ctx), parser.clone(), tx),
            ctx,
            scanner,
            foreground,
            parser,
            events: rx,
            dir,
        }
    }

    fn foo() -> GameTemplate {
        GameTemplate::new("foo.exe", "", "Windows", "foo")
    }

    async fn subscribe(ctx: &AppContext, screen: &str) -> RecordingSink {
        let sink = RecordingSink::default();
        let id = ctx.hub.register(Box::new(sink.clone())).await;
        ctx.hub.set_screen(id, screen).await;
        sink
    }

    fn read(h: &Harness, name: &str) -> String {
        std::fs::read_to_string(h.dir.path().join(name)).unwrap()
    }

    #[tokio::test]
    async fn focused_native_process_is_tracked() {
        let mut h = harness(vec![foo()], FakeParser::default());
        let game_screen = subscribe(&h.ctx, "game").await;
        h.scanner.set(&[("explorer.exe", 4), ("FOO.EXE", 100)]);
        h.foreground.focus(Some(100));

        let outcome = h.poller.tick().await.unwrap();

        assert_eq!(outcome, TickOutcome::Committed { notified: true });
        assert_eq!(h.ctx.current().await, CanonicalState::tracking("foo", "Windows"));
        assert_eq!(
            game_screen.frames(),
            vec![json!({"type": "update", "screen": "game", "payload": {"game": "foo"}})]
        );
        assert_eq!(read(&h, GAME_FILE), "foo");
        assert_eq!(read(&h, CONSOLE_FILE), "Windows");
        assert!(matches!(h.events.try_recv(), Ok(DaemonEvent::StateCommitted(_))));
    }

    #[tokio::test]
    async fn os_caption_names_native_process() {
        let mut h = harness(vec![foo()], FakeParser::default());
        h.scanner.set(&[("foo.exe", 100)]);
        h.foreground.title(100, "Foo: Chapter 2");
        h.poller.tick().await.unwrap();
        assert_eq!(h.ctx.current().await.game, "Foo: Chapter 2");
    }

    #[tokio::test]
    async fn emulator_game_comes_from_history_log() {
        let mut h = harness(vec![], FakeParser::with("Super Game", "Nintendo - NES"));
        let all = subscribe(&h.ctx, "*").await;
        h.scanner.set(&[("retroarch.exe", 42)]);

        h.poller.tick().await.unwrap();

        assert_eq!(
            h.ctx.current().await,
            CanonicalState::tracking("Super Game", "Nintendo - NES")
        );
        let screens: Vec<_> = all.frames().iter().map(|f| f["screen"].clone()).collect();
        assert_eq!(screens, vec![json!("game"), json!("system"), json!("all"), json!("thumbnails")]);
    }

    #[tokio::test]
    async fn history_log_error_keeps_previous_state() {
        let mut h = harness(vec![], FakeParser::default());
        h.scanner.set(&[("retroarch.exe", 42)]);
        assert!(matches!(h.poller.tick().await, Err(TickError::Playlist(_))));
        assert!(h.ctx.current().await.is_idle());
    }

    #[tokio::test]
    async fn unfocused_tie_is_deterministic() {
        let templates = vec![
            GameTemplate::new("alpha.exe", "", "Windows", "alpha"),
            GameTemplate::new("beta.exe", "", "Windows", "beta"),
        ];
        for _ in 0..3 {
            let mut h = harness(templates.clone(), FakeParser::with("Emu", "Sys"));
            h.scanner.set(&[("beta.exe", 10), ("alpha.exe", 20), ("retroarch.exe", 30)]);
            h.foreground.focus(Some(999));
            h.poller.tick().await.unwrap();
            assert_eq!(h.ctx.current().await.game, "alpha");
        }
    }

    #[tokio::test]
    async fn missing_focus_skips_contested_tick() {
        let mut h = harness(
            vec![foo(), GameTemplate::new("bar.exe", "", "Windows", "bar")],
            FakeParser::default(),
        );
        h.scanner.set(&[("foo.exe", 1), ("bar.exe", 2)]);
        h.foreground.focus(None);
        assert!(matches!(h.poller.tick().await, Err(TickError::Foreground(_))));
        assert!(h.ctx.current().await.is_idle());
    }

    #[tokio::test]
    async fn exit_returns_to_idle_and_clears_sinks() {
        let mut h = harness(vec![foo()], FakeParser::default());
        let game_screen = subscribe(&h.ctx, "game").await;
        h.scanner.set(&[("foo.exe", 100)]);
        h.poller.tick().await.unwrap();

        h.scanner.set(&[]);
        let outcome = h.poller.tick().await.unwrap();

        assert_eq!(outcome, TickOutcome::Committed { notified: true });
        assert!(h.ctx.current().await.is_idle());
        assert_eq!(read(&h, GAME_FILE), "");
        assert_eq!(read(&h, CONSOLE_FILE), "");
        let frames = game_screen.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["payload"], json!({"game": ""}));
    }

    #[tokio::test]
    async fn console_only_change_is_committed_without_publish() {
        let parser = FakeParser::with("Tetris", "Nintendo - Game Boy");
        let mut h = harness(vec![], parser);
        let all = subscribe(&h.ctx, "*").await;
        h.scanner.set(&[("retroarch.exe", 42)]);
        h.poller.tick().await.unwrap();
        let published = all.frames().len();

        *h.parser.entry.lock().unwrap() = Some(crate::playlist::PlaylistEntry {
            game: "Tetris".into(),
            console: "Nintendo - NES".into(),
        });
        let outcome = h.poller.tick().await.unwrap();

        assert_eq!(outcome, TickOutcome::Committed { notified: false });
        assert_eq!(h.ctx.current().await.console, "Nintendo - NES");
        assert_eq!(all.frames().len(), published);
    }

    #[tokio::test]
    async fn unchanged_game_is_not_republished() {
        let mut h = harness(vec![foo()], FakeParser::default());
        let game_screen = subscribe(&h.ctx, "game").await;
        h.scanner.set(&[("foo.exe", 100)]);
        h.poller.tick().await.unwrap();
        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Unchanged);
        assert_eq!(game_screen.frames().len(), 1);
    }

    #[tokio::test]
    async fn scan_failure_skips_tick() {
        let mut h = harness(vec![foo()], FakeParser::default());
        h.scanner.set(&[("foo.exe", 100)]);
        h.poller.tick().await.unwrap();
        h.scanner.fail();
        assert!(matches!(h.poller.tick().await, Err(TickError::Scan(_))));
        assert_eq!(h.ctx.current().await.game, "foo");
    }

    #[tokio::test]
    async fn first_idle_tick_empties_output_files() {
        let mut h = harness(vec![foo()], FakeParser::default());
        std::fs::write(h.dir.path().join(GAME_FILE), "stale").unwrap();
        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Unchanged);
        assert_eq!(read(&h, GAME_FILE), "");
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let h = harness(vec![foo()], FakeParser::default());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(h.poller.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
