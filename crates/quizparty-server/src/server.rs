use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use uuid::Uuid;

use quizparty_common::rules::GameRules;

use crate::broadcast::Broadcaster;
use crate::connection::{self, ConnectionHandle};
use crate::quiz::{LocalQuizSource, QuizSource};
use crate::registry::RoomRegistry;

pub struct ServerState {
    pub registry: RoomRegistry,
    pub broadcaster: Broadcaster,
    pub connections: RwLock<HashMap<Uuid, ConnectionHandle>>,
    pub quiz: Arc<dyn QuizSource>,
    pub rules: GameRules,
    pub max_connections: usize,
}

pub type SharedState = Arc<ServerState>;

pub fn new_state(rules: GameRules, max_connections: usize) -> SharedState {
    Arc::new(ServerState {
        registry: RoomRegistry::new(),
        broadcaster: Broadcaster::new(),
        connections: RwLock::new(HashMap::new()),
        quiz: Arc::new(LocalQuizSource::new()),
        rules,
        max_connections,
    })
}

pub async fn run(addr: SocketAddr, rules: GameRules, max_connections: usize) -> anyhow::Result<()> {
    let state = new_state(rules, max_connections);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    // Sweep for rooms that emptied without an explicit leave, e.g. a
    // finished game whose last watcher channel died.
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                ticker.tick().await;
                for code in state.registry.prune_empty().await {
                    state.broadcaster.drop_room(&code).await;
                    tracing::info!("Room {} retired (empty on sweep)", code);
                }
            }
        });
    }

    loop {
        let (stream, peer_addr) = listener.accept().await?;

        // Enforce max connections
        let conn_count = state.connections.read().await.len();
        if conn_count >= state.max_connections {
            tracing::warn!(
                "Rejecting connection from {} (max {} reached)",
                peer_addr,
                state.max_connections
            );
            drop(stream);
            continue;
        }

        tracing::debug!("New connection from {}", peer_addr);

        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = connection::handle_connection(stream, state).await {
                tracing::warn!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}
