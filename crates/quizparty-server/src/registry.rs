use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use quizparty_common::room::{RoomError, RoomStatus, RoomSummary};

use crate::room::RoomState;

/// All mutations of one room go through its own mutex, so at most one
/// mutation is in flight per code while different rooms proceed in
/// parallel. The registry lock only guards the map itself.
pub type SharedRoom = Arc<Mutex<RoomState>>;

// No ambiguous characters (0/O, 1/I), same alphabet the game always used.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, SharedRoom>>,
    next_room_id: AtomicI64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            next_room_id: AtomicI64::new(1),
        }
    }

    pub async fn create(
        &self,
        owner_name: &str,
        max_players: usize,
    ) -> Result<(String, SharedRoom), RoomError> {
        let owner_name = owner_name.trim();
        if owner_name.is_empty() {
            return Err(RoomError::InvalidParameter("ownerName required".into()));
        }
        if max_players < 2 {
            return Err(RoomError::InvalidParameter(
                "maxPlayers must be at least 2".into(),
            ));
        }

        let mut rooms = self.rooms.write().await;
        let code = loop {
            let candidate = generate_code();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        let id = self.next_room_id.fetch_add(1, Ordering::SeqCst);
        let room = Arc::new(Mutex::new(RoomState::new(
            id,
            code.clone(),
            owner_name.to_string(),
            max_players,
        )));
        rooms.insert(code.clone(), room.clone());
        Ok((code, room))
    }

    pub async fn get(&self, code: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(&normalize(code)).cloned()
    }

    pub async fn remove(&self, code: &str) {
        self.rooms.write().await.remove(&normalize(code));
    }

    /// Waiting rooms only, for the lobby listing.
    pub async fn list(&self) -> Vec<RoomSummary> {
        let rooms: Vec<SharedRoom> = self.rooms.read().await.values().cloned().collect();
        let mut out = Vec::new();
        for room in rooms {
            let state = room.lock().await;
            if state.room.status == RoomStatus::Waiting {
                out.push(state.summary());
            }
        }
        out
    }

    pub async fn prune_empty(&self) -> Vec<String> {
        let rooms: Vec<(String, SharedRoom)> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(code, room)| (code.clone(), room.clone()))
            .collect();

        let mut pruned = Vec::new();
        for (code, room) in rooms {
            if room.lock().await.players.is_empty() {
                pruned.push(code);
            }
        }

        if !pruned.is_empty() {
            let mut map = self.rooms.write().await;
            for code in &pruned {
                map.remove(code);
            }
        }
        pruned
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_alphabet() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids_and_codes() {
        let registry = RoomRegistry::new();
        let (code_a, room_a) = registry.create("Ann", 4).await.unwrap();
        let (code_b, room_b) = registry.create("Bo", 4).await.unwrap();
        assert_ne!(code_a, code_b);
        assert_ne!(room_a.lock().await.room.id, room_b.lock().await.room.id);
    }

    #[tokio::test]
    async fn test_create_rejects_small_capacity() {
        let registry = RoomRegistry::new();
        assert!(matches!(
            registry.create("Ann", 1).await,
            Err(RoomError::InvalidParameter(_))
        ));
        assert!(matches!(
            registry.create("  ", 4).await,
            Err(RoomError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let registry = RoomRegistry::new();
        let (code, _) = registry.create("Ann", 4).await.unwrap();
        assert!(registry.get(&code.to_lowercase()).await.is_some());
        assert!(registry.get("NOSUCH").await.is_none());
    }

    #[tokio::test]
    async fn test_list_only_waiting_rooms() {
        let registry = RoomRegistry::new();
        let (_, room_a) = registry.create("Ann", 4).await.unwrap();
        registry.create("Bo", 4).await.unwrap();

        {
            let mut state = room_a.lock().await;
            state.join("Bo").unwrap();
            state.set_ready("Bo", true).unwrap();
            state.start("Ann").unwrap();
        }

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].owner_name, "Bo");
    }

    #[tokio::test]
    async fn test_prune_empty_rooms() {
        let registry = RoomRegistry::new();
        let (code, room) = registry.create("Ann", 4).await.unwrap();
        registry.create("Bo", 4).await.unwrap();

        room.lock().await.remove_player("Ann");
        let pruned = registry.prune_empty().await;
        assert_eq!(pruned, vec![code]);
        assert_eq!(registry.len().await, 1);
    }
}
