use quizparty_common::protocol::ServerMessage;
use quizparty_common::room::{LeaderItem, Player, Room, RoomError, RoomStatus, RoomSummary};
use quizparty_common::round::RoundPayload;

/// Authoritative per-room state. Every mutation goes through the
/// room's mutex (see registry), so methods here can assume exclusive
/// access and keep the invariants locally: roster never exceeds
/// `max_players`, names stay unique, exactly one owner while the
/// roster is non-empty, and the status only moves forward.
pub struct RoomState {
    pub room: Room,
    pub players: Vec<Player>,
    pub round: Option<RoundPayload>,
    pub seconds_left: u32,
    pub round_solved: bool,
    pub last_round_no: u32,
    next_player_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A second concurrent start request is acknowledged, not rejected.
    AlreadyStarted,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuessGate {
    Eligible,
    /// Late (past `quiz_exp`) or from an eliminated player: acked but
    /// never scored or broadcast.
    Ignored,
}

#[derive(Debug)]
pub struct LeaveOutcome {
    pub removed: bool,
    pub owner_changed: bool,
    pub empty: bool,
}

fn names_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl RoomState {
    pub fn new(id: i64, code: String, owner_name: String, max_players: usize) -> Self {
        let mut owner = Player::new(1, owner_name.clone());
        owner.is_owner = true;
        Self {
            room: Room {
                id,
                code,
                status: RoomStatus::Waiting,
                max_players,
                owner_name,
            },
            players: vec![owner],
            round: None,
            seconds_left: 0,
            round_solved: false,
            last_round_no: 0,
            next_player_id: 2,
        }
    }

    pub fn find_player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| names_match(&p.name, name))
    }

    fn find_player_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| names_match(&p.name, name))
    }

    pub fn join(&mut self, name: &str) -> Result<(), RoomError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidParameter("name required".into()));
        }
        if self.room.status != RoomStatus::Waiting {
            return Err(RoomError::RoomNotJoinable);
        }
        if self.players.len() >= self.room.max_players {
            return Err(RoomError::RoomFull);
        }
        if self.find_player(name).is_some() {
            return Err(RoomError::NameTaken);
        }
        let player = Player::new(self.next_player_id, name.to_string());
        self.next_player_id += 1;
        self.players.push(player);
        Ok(())
    }

    pub fn set_ready(&mut self, name: &str, ready: bool) -> Result<(), RoomError> {
        if self.room.status != RoomStatus::Waiting {
            return Err(RoomError::RoomNotJoinable);
        }
        let player = self.find_player_mut(name).ok_or(RoomError::NotFound)?;
        player.is_ready = ready;
        Ok(())
    }

    /// Validate a start request without applying it. Ordering matters
    /// for callers: the owner check comes before any precondition, so
    /// a non-owner always gets Forbidden.
    pub fn check_start(&self, owner_name: &str) -> Result<StartOutcome, RoomError> {
        let caller = self.find_player(owner_name).ok_or(RoomError::Forbidden)?;
        if !caller.is_owner {
            return Err(RoomError::Forbidden);
        }
        match self.room.status {
            RoomStatus::Playing => return Ok(StartOutcome::AlreadyStarted),
            RoomStatus::Finished => return Err(RoomError::RoomNotJoinable),
            RoomStatus::Waiting => {}
        }
        if self.players.len() < 2 {
            return Err(RoomError::PreconditionFailed(
                "need at least 2 players".into(),
            ));
        }
        if self.players.iter().any(|p| !p.is_owner && !p.is_ready) {
            return Err(RoomError::PreconditionFailed(
                "all players must be ready".into(),
            ));
        }
        Ok(StartOutcome::Started)
    }

    pub fn start(&mut self, owner_name: &str) -> Result<StartOutcome, RoomError> {
        let outcome = self.check_start(owner_name)?;
        if outcome == StartOutcome::Started {
            self.room.status = RoomStatus::Playing;
        }
        Ok(outcome)
    }

    /// Validate a guess attempt without scoring it. The correctness
    /// check itself belongs to the quiz source.
    pub fn guess_gate(&self, name: &str, now_ms: i64) -> Result<GuessGate, RoomError> {
        if self.room.status != RoomStatus::Playing {
            return Err(RoomError::PreconditionFailed("room is not playing".into()));
        }
        let round = match &self.round {
            Some(r) => r,
            None => return Err(RoomError::PreconditionFailed("no active round".into())),
        };
        let player = self.find_player(name).ok_or(RoomError::NotFound)?;
        if player.is_out || round.is_expired(now_ms) {
            return Ok(GuessGate::Ignored);
        }
        Ok(GuessGate::Eligible)
    }

    pub fn apply_correct(&mut self, name: &str, increment: u32) {
        if let Some(player) = self.find_player_mut(name) {
            player.score += increment;
        }
        self.round_solved = true;
    }

    /// Idempotent: removing an absent name is not an error. Ownership
    /// transfers to the next-joined remaining player.
    pub fn remove_player(&mut self, name: &str) -> LeaveOutcome {
        let before = self.players.len();
        let was_owner = self.find_player(name).map(|p| p.is_owner).unwrap_or(false);
        self.players.retain(|p| !names_match(&p.name, name));
        let removed = self.players.len() < before;

        let mut owner_changed = false;
        if removed && was_owner {
            if let Some(next) = self.players.first_mut() {
                next.is_owner = true;
                self.room.owner_name = next.name.clone();
                owner_changed = true;
            }
        }

        LeaveOutcome {
            removed,
            owner_changed,
            empty: self.players.is_empty(),
        }
    }

    /// Disconnect during play: the player stays on the roster but no
    /// longer scores.
    pub fn mark_out(&mut self, name: &str) -> bool {
        match self.find_player_mut(name) {
            Some(p) if !p.is_out => {
                p.is_out = true;
                true
            }
            _ => false,
        }
    }

    pub fn all_out(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.is_out)
    }

    /// Terminal transition. Returns the winner and the leaderboard,
    /// sorted by score descending.
    pub fn finish(&mut self) -> (Option<Player>, Vec<LeaderItem>) {
        if self.room.status.can_advance_to(RoomStatus::Finished) {
            self.room.status = RoomStatus::Finished;
        }
        self.round = None;
        self.seconds_left = 0;

        let mut leaderboard: Vec<LeaderItem> = self
            .players
            .iter()
            .map(|p| LeaderItem {
                name: p.name.clone(),
                score: p.score,
            })
            .collect();
        leaderboard.sort_by(|a, b| b.score.cmp(&a.score));

        let winner = leaderboard
            .first()
            .and_then(|top| self.find_player(&top.name))
            .cloned();
        (winner, leaderboard)
    }

    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::Snapshot {
            room: self.room.clone(),
            players: self.players.clone(),
            round: self.round.clone(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            code: self.room.code.clone(),
            owner_name: self.room.owner_name.clone(),
            status: self.room.status,
            player_count: self.players.len(),
            max_players: self.room.max_players,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizparty_common::round::now_ms;
    use uuid::Uuid;

    fn waiting_room() -> RoomState {
        RoomState::new(1, "ABCDEF".into(), "Ann".into(), 2)
    }

    fn install_round(state: &mut RoomState, exp: i64) {
        state.last_round_no += 1;
        state.round = Some(RoundPayload {
            round_no: state.last_round_no,
            quiz_id: "q1".into(),
            quiz_token: Uuid::new_v4(),
            quiz_exp: exp,
            seconds: 60,
            level: 1,
        });
        state.round_solved = false;
    }

    fn owner_count(state: &RoomState) -> usize {
        state.players.iter().filter(|p| p.is_owner).count()
    }

    #[test]
    fn test_create_scenario() {
        let state = waiting_room();
        assert_eq!(state.room.status, RoomStatus::Waiting);
        assert_eq!(state.players.len(), 1);
        assert!(state.players[0].is_owner);
        assert!(!state.players[0].is_ready);
    }

    #[test]
    fn test_join_full_room() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.join("Cy"), Err(RoomError::RoomFull));
    }

    #[test]
    fn test_join_duplicate_name() {
        let mut state = RoomState::new(1, "ABCDEF".into(), "Ann".into(), 4);
        state.join("Bo").unwrap();
        assert_eq!(state.join("bo"), Err(RoomError::NameTaken));
        assert_eq!(state.join("Ann"), Err(RoomError::NameTaken));
    }

    #[test]
    fn test_start_requires_owner() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        assert_eq!(state.start("Bo"), Err(RoomError::Forbidden));
        assert_eq!(state.start("Ann"), Ok(StartOutcome::Started));
        assert_eq!(state.room.status, RoomStatus::Playing);
    }

    #[test]
    fn test_start_requires_two_players() {
        let mut state = waiting_room();
        assert!(matches!(
            state.start("Ann"),
            Err(RoomError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_start_requires_everyone_ready() {
        let mut state = RoomState::new(1, "ABCDEF".into(), "Ann".into(), 3);
        state.join("Bo").unwrap();
        state.join("Cy").unwrap();
        state.set_ready("Bo", true).unwrap();
        assert!(matches!(
            state.start("Ann"),
            Err(RoomError::PreconditionFailed(_))
        ));
        state.set_ready("Cy", true).unwrap();
        assert_eq!(state.start("Ann"), Ok(StartOutcome::Started));
    }

    #[test]
    fn test_check_start_does_not_mutate() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();

        assert_eq!(state.check_start("Bo"), Err(RoomError::Forbidden));
        assert_eq!(state.check_start("Ann"), Ok(StartOutcome::Started));
        assert_eq!(state.room.status, RoomStatus::Waiting);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        assert_eq!(state.start("Ann"), Ok(StartOutcome::AlreadyStarted));
    }

    #[test]
    fn test_ready_only_while_waiting() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        assert_eq!(
            state.set_ready("Bo", false),
            Err(RoomError::RoomNotJoinable)
        );
        assert_eq!(state.set_ready("Zed", true), Err(RoomError::RoomNotJoinable));
    }

    #[test]
    fn test_ready_unknown_player() {
        let mut state = waiting_room();
        assert_eq!(state.set_ready("Zed", true), Err(RoomError::NotFound));
    }

    #[test]
    fn test_expired_guess_never_scores() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        install_round(&mut state, now_ms() - 1);

        let gate = state.guess_gate("Ann", now_ms()).unwrap();
        assert_eq!(gate, GuessGate::Ignored);
        assert_eq!(state.find_player("Ann").unwrap().score, 0);
    }

    #[test]
    fn test_out_player_guess_ignored() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        install_round(&mut state, now_ms() + 60_000);
        assert!(state.mark_out("Bo"));

        let gate = state.guess_gate("Bo", now_ms()).unwrap();
        assert_eq!(gate, GuessGate::Ignored);
    }

    #[test]
    fn test_correct_guess_scores_and_solves_round() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        install_round(&mut state, now_ms() + 60_000);

        let gate = state.guess_gate("Bo", now_ms()).unwrap();
        assert_eq!(gate, GuessGate::Eligible);
        state.apply_correct("Bo", 1);
        assert_eq!(state.find_player("Bo").unwrap().score, 1);
        assert!(state.round_solved);
    }

    #[test]
    fn test_guess_while_waiting_rejected() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        assert!(matches!(
            state.guess_gate("Bo", now_ms()),
            Err(RoomError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_guess_unknown_player() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        install_round(&mut state, now_ms() + 60_000);
        assert_eq!(state.guess_gate("Zed", now_ms()), Err(RoomError::NotFound));
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut state = waiting_room();
        let outcome = state.remove_player("Zed");
        assert!(!outcome.removed);
        assert!(!outcome.empty);
        assert_eq!(state.players.len(), 1);
    }

    #[test]
    fn test_owner_leave_transfers_to_next_joined() {
        let mut state = RoomState::new(1, "ABCDEF".into(), "Ann".into(), 4);
        state.join("Bo").unwrap();
        state.join("Cy").unwrap();

        let outcome = state.remove_player("Ann");
        assert!(outcome.removed);
        assert!(outcome.owner_changed);
        assert!(!outcome.empty);
        assert_eq!(state.room.owner_name, "Bo");
        assert!(state.find_player("Bo").unwrap().is_owner);
        assert_eq!(owner_count(&state), 1);
    }

    #[test]
    fn test_last_player_leave_empties_room() {
        let mut state = waiting_room();
        let outcome = state.remove_player("Ann");
        assert!(outcome.removed);
        assert!(outcome.empty);
    }

    #[test]
    fn test_exactly_one_owner_through_churn() {
        let mut state = RoomState::new(1, "ABCDEF".into(), "Ann".into(), 4);
        state.join("Bo").unwrap();
        state.join("Cy").unwrap();
        assert_eq!(owner_count(&state), 1);
        state.remove_player("Bo");
        assert_eq!(owner_count(&state), 1);
        state.remove_player("Ann");
        assert_eq!(owner_count(&state), 1);
        assert!(state.find_player("Cy").unwrap().is_owner);
    }

    #[test]
    fn test_roster_never_exceeds_capacity() {
        let mut state = RoomState::new(1, "ABCDEF".into(), "Ann".into(), 3);
        let _ = state.join("Bo");
        let _ = state.join("Cy");
        let _ = state.join("Di");
        let _ = state.join("Ed");
        assert!(state.players.len() <= 3);
        state.remove_player("Bo");
        state.join("Ed").unwrap();
        assert!(state.players.len() <= 3);
    }

    #[test]
    fn test_finish_builds_sorted_leaderboard() {
        let mut state = RoomState::new(1, "ABCDEF".into(), "Ann".into(), 3);
        state.join("Bo").unwrap();
        state.join("Cy").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.set_ready("Cy", true).unwrap();
        state.start("Ann").unwrap();
        install_round(&mut state, now_ms() + 60_000);
        state.apply_correct("Cy", 3);
        state.apply_correct("Bo", 1);

        let (winner, leaderboard) = state.finish();
        assert_eq!(state.room.status, RoomStatus::Finished);
        assert_eq!(winner.unwrap().name, "Cy");
        assert_eq!(leaderboard[0].score, 3);
        assert!(leaderboard.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_finished_is_terminal() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        state.finish();

        assert_eq!(state.set_ready("Bo", true), Err(RoomError::RoomNotJoinable));
        assert_eq!(state.start("Ann"), Err(RoomError::RoomNotJoinable));
        assert!(state.guess_gate("Bo", now_ms()).is_err());
        assert_eq!(state.join("Cy"), Err(RoomError::RoomNotJoinable));
        // Leave stays valid for cleanup.
        assert!(state.remove_player("Bo").removed);
    }

    #[test]
    fn test_finish_from_finished_keeps_status() {
        let mut state = waiting_room();
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        state.finish();
        let (_, leaderboard) = state.finish();
        assert_eq!(state.room.status, RoomStatus::Finished);
        assert_eq!(leaderboard.len(), 2);
    }
}
