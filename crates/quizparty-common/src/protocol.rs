use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use uuid::Uuid;

use crate::room::{LeaderItem, Player, Room, RoomError, RoomSummary};
use crate::round::RoundPayload;

// -- Framing --

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(64 * 1024)
        .new_framed(stream)
}

// -- Client -> Server Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    // Handshake
    Hello {
        player_name: String,
        version: String,
    },

    // Rooms
    CreateRoom {
        owner_name: String,
        max_players: usize,
    },
    JoinRoom {
        code: String,
        name: String,
    },
    SetReady {
        code: String,
        name: String,
        ready: bool,
    },
    StartRoom {
        code: String,
        owner_name: String,
    },
    SubmitGuess {
        code: String,
        name: String,
        guess: String,
    },
    LeaveRoom {
        code: String,
        name: String,
    },

    /// Attach the realtime channel for a room without joining its
    /// roster. Answered with a full snapshot before any update.
    WatchRoom {
        code: String,
    },

    // One-shot queries, also valid before the handshake
    ListRooms,
    QuizPreview {
        level: u32,
    },
    HealthCheck,

    // Connection
    Ping,
    Disconnect,
}

// -- Server -> Client Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    // Handshake
    Welcome {
        conn_id: Uuid,
        server_version: String,
    },
    HandshakeError {
        reason: String,
    },

    // Query replies
    RoomCreated {
        room: Room,
    },
    RoomList {
        rooms: Vec<RoomSummary>,
    },
    QuizReady {
        level: u32,
    },
    HealthStatus {
        status: String,
    },

    // Room channel: full state, then incremental updates in the
    // order the mutations were applied.
    Snapshot {
        room: Room,
        players: Vec<Player>,
        round: Option<RoundPayload>,
    },
    PlayerJoined {
        players: Vec<Player>,
    },
    ReadyChanged {
        players: Vec<Player>,
    },
    RoundStarted {
        round: RoundPayload,
    },
    TimerTick {
        seconds: u32,
    },
    GuessResult {
        name: String,
        guess: String,
        correct: bool,
        players: Vec<Player>,
    },
    PlayerLeft {
        name: String,
        players: Vec<Player>,
    },
    PlayerOut {
        name: String,
        players: Vec<Player>,
    },
    OwnerChanged {
        players: Vec<Player>,
    },
    GameOver {
        winner: Option<Player>,
        leaderboard: Vec<LeaderItem>,
    },
    RoomClosed,

    // Request acks
    GuessAck {
        accepted: bool,
    },
    RoomLeft,

    // Errors
    Error {
        code: ErrorCode,
        message: String,
    },

    // Connection
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    RoomFull,
    NameTaken,
    RoomNotJoinable,
    Forbidden,
    PreconditionFailed,
    Expired,
    InvalidParameter,
    InternalError,
}

impl From<&RoomError> for ErrorCode {
    fn from(e: &RoomError) -> Self {
        match e {
            RoomError::NotFound => ErrorCode::NotFound,
            RoomError::RoomFull => ErrorCode::RoomFull,
            RoomError::NameTaken => ErrorCode::NameTaken,
            RoomError::RoomNotJoinable => ErrorCode::RoomNotJoinable,
            RoomError::Forbidden => ErrorCode::Forbidden,
            RoomError::PreconditionFailed(_) => ErrorCode::PreconditionFailed,
            RoomError::Expired => ErrorCode::Expired,
            RoomError::InvalidParameter(_) => ErrorCode::InvalidParameter,
        }
    }
}

impl ServerMessage {
    pub fn from_error(e: &RoomError) -> Self {
        ServerMessage::Error {
            code: ErrorCode::from(e),
            message: e.to_string(),
        }
    }
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(
    transport: &mut Transport,
    msg: &T,
) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: for<'de> Deserialize<'de>>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}
