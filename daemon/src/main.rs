mod config;
mod detector;
mod error;
mod event;
mod foreground;
mod hub;
mod output;
mod paths;
mod playlist;
mod process_monitor;
mod protocol;
mod registry;
mod scanner;
mod server;
mod session;
mod state;
mod status;
mod thumbnails;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};

use crate::event::DaemonEvent;
use crate::foreground::OsForeground;
use crate::playlist::LplHistoryParser;
use crate::registry::{GameRegistry, TemplateStore};
use crate::scanner::SysinfoScanner;
use crate::state::AppContext;
use crate::thumbnails::StagedThumbnails;

#[derive(Parser, Debug)]
#[command(name = "trackgame-daemon")]
#[command(about = "Tracks the running game and pushes it to overlay clients")]
struct Args {
    /// Config file (defaults to config.toml in the app data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter; RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Web server port, overriding `web_port` from the config
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir()?;
    std::fs::create_dir_all(&app_dir)
        .with_context(|| format!("Failed to create app data directory {}", app_dir.display()))?;

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| paths::config_file_path(&app_dir));
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::error!("Config error (using defaults): {e:#}");
        config::Config::default()
    });
    let port = args.port.unwrap_or(initial_config.general.web_port);

    // ── Template registry ─────────────────────────────────────────────────────
    let save_dir = initial_config.general.save_dir(&app_dir);
    std::fs::create_dir_all(&save_dir)
        .with_context(|| format!("Failed to create save directory {}", save_dir.display()))?;
    let registry =
        GameRegistry::load_or_empty(TemplateStore::new(paths::templates_file_path(&save_dir)));

    let shared_config = Arc::new(RwLock::new(initial_config));
    let ctx = Arc::new(AppContext::new(
        Arc::clone(&shared_config),
        registry,
        Arc::new(SysinfoScanner::new()),
        Arc::new(OsForeground),
        StagedThumbnails::in_temp_dir(),
        app_dir.clone(),
    ));

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path(&app_dir);
    let mut current_status = status::DaemonStatus::new();
    status::write_status(&status_path, &current_status);

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(32);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Web server ────────────────────────────────────────────────────────────
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on ws://{addr}/startport");
    let server_task = tokio::spawn(server::serve(
        Arc::clone(&ctx),
        listener,
        shutdown_rx.clone(),
    ));

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    let poller = process_monitor::Poller::new(
        Arc::clone(&ctx),
        Arc::new(LplHistoryParser),
        event_tx.clone(),
    );
    let poller_task = tokio::spawn(poller.run(shutdown_rx));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    tracing::info!("trackgame-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        match evt {
            DaemonEvent::StateCommitted(state) => {
                current_status.apply(&state, chrono::Local::now().to_rfc3339());
                status::write_status(&status_path, &current_status);
            }

            DaemonEvent::ConfigReloaded(new_config) => {
                tracing::info!("Config reloaded");
                if args.port.is_none() && new_config.general.web_port != port {
                    tracing::warn!(
                        "web_port changed to {}; restart the daemon to apply it",
                        new_config.general.web_port
                    );
                }
                *shared_config.write().await = new_config;
            }

            DaemonEvent::Shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    drop(event_rx);
    let _ = shutdown_tx.send(true);
    if let Err(e) = poller_task.await {
        tracing::warn!("Poller task ended abnormally: {e}");
    }
    match server_task.await {
        Ok(Err(e)) => tracing::warn!("Web server error: {e:#}"),
        Err(e) => tracing::warn!("Web server task ended abnormally: {e}"),
        Ok(Ok(())) => {}
    }

    current_status.apply(&state::CanonicalState::default(), chrono::Local::now().to_rfc3339());
    status::write_status(&status_path, &current_status);
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    Ok(())
}
