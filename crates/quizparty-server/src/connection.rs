use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use quizparty_common::protocol::{
    self, framed_transport, serialize_message, ClientMessage, ServerMessage,
};

use crate::handler;
use crate::server::SharedState;

pub struct ConnectionHandle {
    pub conn_id: Uuid,
    pub player_name: String,
    pub tx: mpsc::Sender<ServerMessage>,
    /// Room whose realtime channel this connection is attached to.
    pub room_code: Option<String>,
    /// Roster name this connection joined under, if any. Watchers
    /// attach a channel without one.
    pub joined_name: Option<String>,
}

pub async fn handle_connection(stream: TcpStream, state: SharedState) -> anyhow::Result<()> {
    let mut transport = framed_transport(stream);

    // Step 1: first message. Health and lobby queries are answered
    // without a handshake, on short-lived connections.
    let first: ClientMessage = match protocol::recv_message(&mut transport).await? {
        Some(msg) => msg,
        None => return Ok(()),
    };

    let (conn_id, player_name) = match first {
        ClientMessage::HealthCheck => {
            protocol::send_message(&mut transport, &handler::health_status(&state)).await?;
            return Ok(());
        }
        ClientMessage::ListRooms => {
            let rooms = state.registry.list().await;
            protocol::send_message(&mut transport, &ServerMessage::RoomList { rooms }).await?;
            return Ok(());
        }
        ClientMessage::QuizPreview { level } => {
            protocol::send_message(&mut transport, &handler::quiz_preview(&state, level)).await?;
            return Ok(());
        }
        ClientMessage::Hello {
            player_name,
            version,
        } => {
            tracing::info!(
                "Player '{}' connected (client version: {})",
                player_name,
                version
            );
            let id = Uuid::new_v4();
            protocol::send_message(
                &mut transport,
                &ServerMessage::Welcome {
                    conn_id: id,
                    server_version: env!("CARGO_PKG_VERSION").to_string(),
                },
            )
            .await?;
            (id, player_name)
        }
        _ => {
            protocol::send_message(
                &mut transport,
                &ServerMessage::HandshakeError {
                    reason: "Expected Hello message".into(),
                },
            )
            .await?;
            return Ok(());
        }
    };

    // Step 2: mpsc channel for outbound messages
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    {
        let handle = ConnectionHandle {
            conn_id,
            player_name: player_name.clone(),
            tx: tx.clone(),
            room_code: None,
            joined_name: None,
        };
        state.connections.write().await.insert(conn_id, handle);
    }

    // Step 3: split transport for independent read/write
    let (mut sink, mut stream) = transport.split();

    // Writer task: drains rx and writes to sink
    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serialize_message(&msg) {
                Ok(bytes) => {
                    if sink.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    // Step 4: reader loop
    loop {
        match stream.next().await {
            Some(Ok(frame)) => match protocol::deserialize_message::<ClientMessage>(&frame) {
                Ok(msg) => {
                    if let Err(e) = handler::handle_message(conn_id, msg, &state).await {
                        tracing::error!("Handler error for {}: {}", player_name, e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse message from {}: {}", player_name, e);
                }
            },
            Some(Err(e)) => {
                tracing::warn!("Read error from {}: {}", player_name, e);
                break;
            }
            None => {
                tracing::info!("Player '{}' disconnected", player_name);
                break;
            }
        }
    }

    // Cleanup
    handler::handle_disconnect(conn_id, &state).await;
    write_task.abort();
    Ok(())
}
