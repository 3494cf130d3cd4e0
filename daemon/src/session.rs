/// Handling of inbound client messages on one websocket connection.
///
/// Queries are answered to the requester only. Mutations run to completion
/// before the requester gets a `refresh` hint. Malformed messages are logged
/// and dropped; the connection stays open.
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::hub::ClientId;
use crate::protocol::{parse_inbound, DataQuery, DeleteRequest, Inbound, Outgoing, SaveRequest};
use crate::error::RegistryError;
use crate::registry::{GameRegistry, GameTemplate};
use crate::scanner::ProcessEntry;
use crate::state::AppContext;
use crate::thumbnails::ThumbnailKind;

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub name: String,
    pub title: String,
}

/// Dispatches one text frame from client `id`.
pub async fn handle_text(ctx: &AppContext, id: ClientId, text: &str) {
    let message = match parse_inbound(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Dropping message from client {id}: {e}");
            return;
        }
    };

    match message {
        Inbound::Register { screen } => {
            ctx.hub.set_screen(id, &screen).await;
        }
        Inbound::GetData(query) => {
            let payload = answer(ctx, &query).await;
            ctx.hub.send_to(id, &Outgoing::reply(query.kind(), payload)).await;
        }
        Inbound::SaveData(request) => {
            if let Err(e) = save(ctx, request).await {
                tracing::warn!("Save request from client {id} failed: {e:#}");
            }
            ctx.hub.send_to(id, &Outgoing::refresh()).await;
        }
        Inbound::Delete(DeleteRequest::GameTemplate { process_name }) => {
            let removed = mutate_registry(ctx, |registry| Ok(registry.remove(&process_name))).await;
            if let Err(e) = removed {
                tracing::warn!("Deleting template {process_name} failed: {e:#}");
            }
            ctx.hub.send_to(id, &Outgoing::refresh()).await;
        }
    }
}

// ── Queries ───────────────────────────────────────────────────────────────────

async fn answer(ctx: &AppContext, query: &DataQuery) -> Value {
    let result = match query {
        DataQuery::GameTemplates => {
            let templates: Vec<GameTemplate> = ctx
                .registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .templates()
                .to_vec();
            serde_json::to_value(templates)
        }
        DataQuery::Processes => serde_json::to_value(processes(ctx).await),
        DataQuery::InfoProcess { pid } => {
            let info = match pid.as_ref().and_then(|p| p.as_pid()) {
                Some(pid) => process_info(ctx, pid).await,
                None => {
                    tracing::debug!("infoProcess without a usable pid: {pid:?}");
                    ProcessInfo::default()
                }
            };
            serde_json::to_value(info)
        }
    };
    result.unwrap_or_else(|e| {
        tracing::error!("Failed to serialize {} reply: {e}", query.kind());
        Value::Null
    })
}

async fn os_call_timeout(ctx: &AppContext) -> Duration {
    ctx.config.read().await.general.os_call_timeout()
}

/// Current user processes; empty when the scan fails.
pub async fn processes(ctx: &AppContext) -> Vec<ProcessEntry> {
    let limit = os_call_timeout(ctx).await;
    let scanner = Arc::clone(&ctx.scanner);
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(move || scanner.snapshot())).await
    {
        Ok(Ok(Ok(list))) => list,
        Ok(Ok(Err(e))) => {
            tracing::warn!("Process list query failed: {e}");
            Vec::new()
        }
        Ok(Err(e)) => {
            tracing::warn!("Process list task failed: {e}");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("Process list query timed out");
            Vec::new()
        }
    }
}

/// Executable name and window caption of `pid`; missing parts are empty.
pub async fn process_info(ctx: &AppContext, pid: u32) -> ProcessInfo {
    let limit = os_call_timeout(ctx).await;
    let scanner = Arc::clone(&ctx.scanner);
    let foreground = Arc::clone(&ctx.foreground);
    let lookup = tokio::task::spawn_blocking(move || {
        let name = scanner.process_name(pid).unwrap_or_default();
        let title = foreground.window_title(pid).unwrap_or_else(|e| {
            tracing::debug!("No caption for pid {pid}: {e}");
            String::new()
        });
        ProcessInfo { name, title }
    });
    match tokio::time::timeout(limit, lookup).await {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => {
            tracing::warn!("Process info task failed: {e}");
            ProcessInfo::default()
        }
        Err(_) => {
            tracing::warn!("Process info for pid {pid} timed out");
            ProcessInfo::default()
        }
    }
}

// ── Mutations ─────────────────────────────────────────────────────────────────

async fn save(ctx: &AppContext, request: SaveRequest) -> Result<()> {
    match request {
        SaveRequest::SaveFile {
            file_data,
            name,
            img_type,
        } => {
            let kind = ThumbnailKind::from_img_type(&img_type)?;
            let path = ctx
                .staged
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .stage(kind, &name, &file_data)
                .with_context(|| format!("staging {img_type} image {name:?}"))?;
            tracing::info!("Staged thumbnail {}", path.display());
        }
        SaveRequest::SaveProcess { data_form } => {
            let thumbnails_path = ctx.config.read().await.general.thumbnails_path.clone();
            let mut template =
                GameTemplate::native(data_form.process_name_display.trim(), data_form.window_title);
            // Refused templates must leave the stage for the next attempt.
            GameRegistry::validate(&template)?;
            let committed = ctx
                .staged
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .commit(&thumbnails_path, &template.system)
                .context("moving staged thumbnails")?;
            template.named_titles = committed.named_titles;
            template.named_boxarts = committed.named_boxarts;

            mutate_registry(ctx, |registry| registry.register(template)).await?;
        }
    }
    Ok(())
}

/// Applies `mutate` to the registry, then writes the store on a blocking thread.
async fn mutate_registry<T>(
    ctx: &AppContext,
    mutate: impl FnOnce(&mut GameRegistry) -> Result<T, RegistryError>,
) -> Result<T> {
    let _writing = ctx.store_writes.lock().await;
    let (out, pending) = {
        let mut registry = ctx.registry.lock().unwrap_or_else(|e| e.into_inner());
        let out = mutate(&mut *registry)?;
        (out, registry.pending_save())
    };
    if let Some(pending) = pending {
        tokio::task::spawn_blocking(move || pending.write())
            .await
            .context("template store task failed")??;
    }
    Ok(out)
}
