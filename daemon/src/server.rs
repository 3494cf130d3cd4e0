use anyhow::Result;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path as UrlPath, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::hub::ClientSink;
use crate::registry::GameTemplate;
use crate::session;
use crate::state::{AppContext, CanonicalState};

#[derive(Clone)]
struct ServerState {
    ctx: Arc<AppContext>,
    shutdown: watch::Receiver<bool>,
}

pub fn build_router(ctx: Arc<AppContext>, shutdown: watch::Receiver<bool>) -> Router {
    Router::new()
        .route("/startport", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/state", get(get_state))
        .route("/settings-games/templates", get(get_templates))
        .route("/thumbnails/{*path}", get(get_thumbnail))
        .with_state(ServerState { ctx, shutdown })
}

/// Serves until `shutdown` flips. Open websocket sessions end with it.
pub async fn serve(
    ctx: Arc<AppContext>,
    listener: TcpListener,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = build_router(ctx, shutdown.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    tracing::info!("Web server shut down");
    Ok(())
}

/// Wait until the shutdown signal is received.
async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

async fn get_state(State(state): State<ServerState>) -> Json<CanonicalState> {
    Json(state.ctx.current().await)
}

async fn get_templates(State(state): State<ServerState>) -> Json<Vec<GameTemplate>> {
    let templates = state
        .ctx
        .registry
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .templates()
        .to_vec();
    Json(templates)
}

async fn get_thumbnail(State(state): State<ServerState>, UrlPath(path): UrlPath<String>) -> Response {
    let root = state.ctx.config.read().await.general.thumbnails_path.clone();
    let Some(file) = thumbnail_file(&root, &path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(e) => {
            tracing::debug!("Thumbnail {} unavailable: {e}", file.display());
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Maps a `/thumbnails/...` tail onto `root`, refusing anything but plain components.
fn thumbnail_file(root: &str, tail: &str) -> Option<PathBuf> {
    if root.trim().is_empty() {
        return None;
    }
    let relative = Path::new(tail);
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !plain || relative.as_os_str().is_empty() {
        return None;
    }
    Some(Path::new(root).join(relative))
}

// ── Websocket ─────────────────────────────────────────────────────────────────

struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl ClientSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

async fn ws_handler(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: ServerState) {
    let ServerState { ctx, mut shutdown } = state;
    let (sink, mut stream) = socket.split();
    let id = ctx.hub.register(Box::new(WsSink(sink))).await;

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    session::handle_text(&ctx, id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Client {id} read error: {e}");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    ctx.hub.unregister(id).await;
}
