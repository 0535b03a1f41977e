use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use quizparty_common::protocol::{
    self, deserialize_message, framed_transport, serialize_message, ClientMessage, ServerMessage,
};
use quizparty_common::room::RoomSummary;

use crate::status::NetworkStatus;

/// Every room network action carries a fixed timeout; the server's
/// round expiry handles lateness, not client timers.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(8000);

/// Connect to the server and return channels for bidirectional communication.
pub async fn connect(
    addr: &str,
) -> anyhow::Result<(mpsc::Sender<ClientMessage>, mpsc::Receiver<ServerMessage>)> {
    let stream = TcpStream::connect(addr).await?;
    let transport = framed_transport(stream);
    let (mut sink, mut stream) = transport.split();

    let (client_tx, mut client_rx) = mpsc::channel::<ClientMessage>(64);
    let (server_tx, server_rx) = mpsc::channel::<ServerMessage>(64);

    // Writer task: client_rx -> TCP sink
    tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            match serialize_message(&msg) {
                Ok(bytes) => {
                    if sink.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize client message: {}", e);
                }
            }
        }
    });

    // Reader task: TCP stream -> server_tx
    tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            match deserialize_message::<ServerMessage>(&frame) {
                Ok(msg) => {
                    if server_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse server message: {}", e);
                }
            }
        }
    });

    Ok((client_tx, server_rx))
}

/// Single request on a short-lived connection, like the REST calls it
/// replaces. No handshake needed for the lobby queries.
async fn one_shot(addr: &str, msg: &ClientMessage) -> anyhow::Result<ServerMessage> {
    let stream = TcpStream::connect(addr).await?;
    let mut transport = framed_transport(stream);
    protocol::send_message(&mut transport, msg).await?;
    match protocol::recv_message::<ServerMessage>(&mut transport).await? {
        Some(reply) => Ok(reply),
        None => anyhow::bail!("connection closed before reply"),
    }
}

/// One-shot wrapped in the pending-request hooks and the fixed timeout.
async fn tracked_one_shot(
    addr: &str,
    msg: &ClientMessage,
    status: &NetworkStatus,
) -> anyhow::Result<ServerMessage> {
    status.on_request_start();
    let result = tokio::time::timeout(REQUEST_TIMEOUT, one_shot(addr, msg)).await;
    status.on_request_end();
    match result {
        Ok(inner) => inner,
        Err(_) => anyhow::bail!("request timed out"),
    }
}

pub async fn fetch_room_list(
    addr: &str,
    status: &NetworkStatus,
) -> anyhow::Result<Vec<RoomSummary>> {
    match tracked_one_shot(addr, &ClientMessage::ListRooms, status).await? {
        ServerMessage::RoomList { rooms } => Ok(rooms),
        ServerMessage::Error { message, .. } => anyhow::bail!("room list failed: {}", message),
        other => anyhow::bail!("unexpected reply to ListRooms: {:?}", other),
    }
}

pub async fn fetch_quiz_preview(
    addr: &str,
    level: u32,
    status: &NetworkStatus,
) -> anyhow::Result<()> {
    match tracked_one_shot(addr, &ClientMessage::QuizPreview { level }, status).await? {
        ServerMessage::QuizReady { .. } => Ok(()),
        ServerMessage::Error { message, .. } => anyhow::bail!("quiz preview failed: {}", message),
        other => anyhow::bail!("unexpected reply to QuizPreview: {:?}", other),
    }
}
