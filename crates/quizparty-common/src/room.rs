use serde::{Deserialize, Serialize};

// -- Room lifecycle --

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

impl RoomStatus {
    /// Lifecycle only ever moves forward: Waiting -> Playing -> Finished.
    pub fn can_advance_to(self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Waiting, RoomStatus::Playing)
                | (RoomStatus::Playing, RoomStatus::Finished)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub code: String,
    pub status: RoomStatus,
    pub max_players: usize,
    pub owner_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub is_owner: bool,
    pub is_ready: bool,
    pub score: u32,
    pub is_out: bool,
}

impl Player {
    pub fn new(id: i64, name: String) -> Self {
        Self {
            id,
            name,
            is_owner: false,
            is_ready: false,
            score: 0,
            is_out: false,
        }
    }
}

/// Lobby listing entry; only waiting rooms are advertised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub code: String,
    pub owner_name: String,
    pub status: RoomStatus,
    pub player_count: usize,
    pub max_players: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderItem {
    pub name: String,
    pub score: u32,
}

// -- Errors --

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room not found")]
    NotFound,
    #[error("room is full")]
    RoomFull,
    #[error("name already taken")]
    NameTaken,
    #[error("room is not joinable")]
    RoomNotJoinable,
    #[error("only the room owner may do that")]
    Forbidden,
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("round has expired")]
    Expired,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        assert!(RoomStatus::Waiting.can_advance_to(RoomStatus::Playing));
        assert!(RoomStatus::Playing.can_advance_to(RoomStatus::Finished));

        assert!(!RoomStatus::Waiting.can_advance_to(RoomStatus::Finished));
        assert!(!RoomStatus::Playing.can_advance_to(RoomStatus::Waiting));
        assert!(!RoomStatus::Finished.can_advance_to(RoomStatus::Waiting));
        assert!(!RoomStatus::Finished.can_advance_to(RoomStatus::Playing));
    }

    #[test]
    fn test_new_player_defaults() {
        let p = Player::new(1, "Ann".into());
        assert!(!p.is_owner);
        assert!(!p.is_ready);
        assert!(!p.is_out);
        assert_eq!(p.score, 0);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RoomStatus::Waiting).unwrap();
        assert_eq!(json, "\"waiting\"");
    }
}
