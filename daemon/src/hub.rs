/// Broadcast hub: the set of connected display clients and their screens.
///
/// Delivery is a direct, best-effort write to each matching client while the
/// subscription lock is held. There is no per-client queue; a write that
/// fails (or exceeds the write timeout) evicts that client and nobody else.
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::protocol::Outgoing;

/// A subscription with this screen receives every publish.
pub const WILDCARD_SCREEN: &str = "*";

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub type ClientId = u64;

/// Write half of a client connection.
#[async_trait]
pub trait ClientSink: Send {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()>;
}

struct Subscription {
    screen: String,
    sink: Box<dyn ClientSink>,
}

pub struct BroadcastHub {
    clients: Mutex<BTreeMap<ClientId, Subscription>>,
    next_id: AtomicU64,
    write_timeout: Duration,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_write_timeout(DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            write_timeout,
        }
    }

    /// Adds a client with an empty screen.
    pub async fn register(&self, sink: Box<dyn ClientSink>) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().await.insert(
            id,
            Subscription {
                screen: String::new(),
                sink,
            },
        );
        tracing::debug!("Client {id} connected");
        id
    }

    /// Returns false if the client is no longer subscribed.
    pub async fn set_screen(&self, id: ClientId, screen: &str) -> bool {
        match self.clients.lock().await.get_mut(&id) {
            Some(sub) => {
                tracing::debug!("Client {id} registered for screen {screen:?}");
                sub.screen = screen.to_string();
                true
            }
            None => false,
        }
    }

    pub async fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.lock().await.remove(&id).is_some();
        if removed {
            tracing::debug!("Client {id} disconnected");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn screen_of(&self, id: ClientId) -> Option<String> {
        self.clients.lock().await.get(&id).map(|s| s.screen.clone())
    }

    /// Sends `{type:"update", screen, payload}` to every client on `screen` or
    /// on the wildcard. Returns how many clients received it.
    pub async fn publish<P: Serialize>(&self, screen: &str, payload: &P) -> usize {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Failed to serialize {screen} payload: {e}");
                return 0;
            }
        };
        let text = match Outgoing::update(screen, payload).to_text() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Failed to serialize {screen} update: {e}");
                return 0;
            }
        };

        let mut clients = self.clients.lock().await;
        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, sub) in clients.iter_mut() {
            if sub.screen != screen && sub.screen != WILDCARD_SCREEN {
                continue;
            }
            if self.write(*id, sub, text.clone()).await {
                delivered += 1;
            } else {
                failed.push(*id);
            }
        }
        for id in failed {
            clients.remove(&id);
        }
        delivered
    }

    /// Direct message to one client. Returns false (and evicts) on failure.
    pub async fn send_to(&self, id: ClientId, message: &Outgoing) -> bool {
        let text = match message.to_text() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Failed to serialize {} reply: {e}", message.kind);
                return false;
            }
        };
        let mut clients = self.clients.lock().await;
        let Some(sub) = clients.get_mut(&id) else {
            return false;
        };
        if self.write(id, sub, text).await {
            true
        } else {
            clients.remove(&id);
            false
        }
    }

    async fn write(&self, id: ClientId, sub: &mut Subscription, text: String) -> bool {
        match tokio::time::timeout(self.write_timeout, sub.sink.send_text(text)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::info!("Evicting client {id}: write failed: {e:#}");
                false
            }
            Err(_) => {
                tracing::info!("Evicting client {id}: write timed out");
                false
            }
        }
    }
}

// ── Test sink ─────────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    /// Records every frame; fails every write once `fail` is set.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        pub frames: Arc<StdMutex<Vec<String>>>,
        pub fail: Arc<std::sync::atomic::AtomicBool>,
    }

    impl RecordingSink {
        pub fn frames(&self) -> Vec<serde_json::Value> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| serde_json::from_str(f).unwrap())
                .collect()
        }

        pub fn break_connection(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ClientSink for RecordingSink {
        async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("connection reset");
            }
            self.frames.lock().unwrap().push(text);
            Ok(())
        }
    }
}
