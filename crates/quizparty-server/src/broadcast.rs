use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use quizparty_common::protocol::ServerMessage;

struct Subscriber {
    conn_id: Uuid,
    tx: mpsc::Sender<ServerMessage>,
}

/// Per-room publish/subscribe. Callers publish while holding the
/// room's mutex, so delivery order per room always matches the order
/// the mutations were applied. The broadcaster never touches room
/// state, it only pushes messages.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach a channel to a room. The snapshot goes out on the new
    /// channel before it is registered, so the subscriber can never
    /// observe an update from before its snapshot. A channel too full
    /// to take the snapshot is not registered at all.
    pub async fn subscribe(
        &self,
        code: &str,
        conn_id: Uuid,
        tx: mpsc::Sender<ServerMessage>,
        snapshot: ServerMessage,
    ) {
        let mut rooms = self.inner.write().await;
        let subs = rooms.entry(code.to_string()).or_default();
        subs.retain(|s| s.conn_id != conn_id);
        if tx.try_send(snapshot).is_ok() {
            subs.push(Subscriber { conn_id, tx });
        }
    }

    pub async fn unsubscribe(&self, code: &str, conn_id: Uuid) {
        let mut rooms = self.inner.write().await;
        if let Some(subs) = rooms.get_mut(code) {
            subs.retain(|s| s.conn_id != conn_id);
            if subs.is_empty() {
                rooms.remove(code);
            }
        }
    }

    /// Deliver to every subscriber of the room, pruning dead channels.
    /// Delivery happens outside the map lock and never awaits a
    /// subscriber: a full channel means the connection stopped
    /// draining, and it is treated the same as a closed one. A slow
    /// subscriber therefore costs only itself, never another room.
    pub async fn publish(&self, code: &str, msg: &ServerMessage) {
        let subs: Vec<(Uuid, mpsc::Sender<ServerMessage>)> = {
            let rooms = self.inner.read().await;
            match rooms.get(code) {
                Some(s) => s.iter().map(|s| (s.conn_id, s.tx.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (conn_id, tx) in subs {
            if tx.try_send(msg.clone()).is_err() {
                dead.push(conn_id);
            }
        }
        if !dead.is_empty() {
            tracing::debug!("Pruning {} dead subscriber(s) from {}", dead.len(), code);
            let mut rooms = self.inner.write().await;
            if let Some(subs) = rooms.get_mut(code) {
                subs.retain(|s| !dead.contains(&s.conn_id));
                if subs.is_empty() {
                    rooms.remove(code);
                }
            }
        }
    }

    pub async fn drop_room(&self, code: &str) {
        self.inner.write().await.remove(code);
    }

    pub async fn subscriber_count(&self, code: &str) -> usize {
        self.inner
            .read()
            .await
            .get(code)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
