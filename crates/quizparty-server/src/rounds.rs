use std::sync::Arc;
use std::time::Duration;

use quizparty_common::protocol::ServerMessage;
use quizparty_common::room::{RoomError, RoomStatus};
use quizparty_common::round::{now_ms, RoundPayload};
use quizparty_common::rules::GameRules;

use crate::broadcast::Broadcaster;
use crate::quiz::QuizSource;
use crate::registry::SharedRoom;
use crate::room::RoomState;

/// Install the next round on a room. `round_no` comes off the room's
/// own counter so it is strictly increasing even across superseded
/// rounds, and `quiz_exp` is stamped server-side.
pub fn next_round(
    state: &mut RoomState,
    rules: &GameRules,
    quiz: &dyn QuizSource,
) -> Result<RoundPayload, RoomError> {
    // The superseded round's token is dead either way.
    if let Some(prev) = &state.round {
        quiz.retire(&prev.quiz_token);
    }
    let item = quiz.issue(rules.level).ok_or_else(|| {
        RoomError::PreconditionFailed("quiz content unavailable".into())
    })?;

    let round_no = state.last_round_no + 1;
    let payload = RoundPayload {
        round_no,
        quiz_id: item.id,
        quiz_token: item.token,
        quiz_exp: now_ms() + i64::from(rules.round_seconds) * 1000,
        seconds: rules.round_seconds,
        level: rules.level,
    };

    state.last_round_no = round_no;
    state.round = Some(payload.clone());
    state.seconds_left = rules.round_seconds;
    state.round_solved = false;
    Ok(payload)
}

/// One timer task per round. It broadcasts a tick every second and,
/// when the budget elapses with no correct guess, ends the game. The
/// `round_no` guard keeps a stale timer from ever firing into a round
/// that superseded it.
pub fn spawn_round_timer(
    room: SharedRoom,
    broadcaster: Broadcaster,
    quiz: Arc<dyn QuizSource>,
    code: String,
    round_no: u32,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await; // first tick fires immediately

        loop {
            ticker.tick().await;
            let mut state = room.lock().await;

            let current = state.round.as_ref().map(|r| r.round_no);
            if state.room.status != RoomStatus::Playing || current != Some(round_no) {
                return;
            }

            state.seconds_left = state.seconds_left.saturating_sub(1);
            let seconds = state.seconds_left;
            broadcaster
                .publish(&code, &ServerMessage::TimerTick { seconds })
                .await;

            if seconds == 0 {
                if !state.round_solved {
                    tracing::info!("Room {} round {} expired unsolved, game over", code, round_no);
                    if let Some(round) = &state.round {
                        quiz.retire(&round.quiz_token);
                    }
                    let (winner, leaderboard) = state.finish();
                    broadcaster.publish(&code, &state.snapshot()).await;
                    broadcaster
                        .publish(&code, &ServerMessage::GameOver { winner, leaderboard })
                        .await;
                }
                return;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::LocalQuizSource;

    fn playing_room() -> RoomState {
        let mut state = RoomState::new(1, "ABCDEF".into(), "Ann".into(), 4);
        state.join("Bo").unwrap();
        state.set_ready("Bo", true).unwrap();
        state.start("Ann").unwrap();
        state
    }

    #[test]
    fn test_round_numbers_strictly_increase() {
        let mut state = playing_room();
        let quiz = LocalQuizSource::new();
        let rules = GameRules::default();

        let mut previous = 0;
        for _ in 0..5 {
            let round = next_round(&mut state, &rules, &quiz).unwrap();
            assert!(round.round_no > previous);
            assert_eq!(round.round_no, previous + 1);
            previous = round.round_no;
        }
    }

    #[test]
    fn test_round_carries_server_budget_and_future_expiry() {
        let mut state = playing_room();
        let quiz = LocalQuizSource::new();
        let rules = GameRules {
            round_seconds: 30,
            ..GameRules::default()
        };

        let round = next_round(&mut state, &rules, &quiz).unwrap();
        assert_eq!(round.seconds, 30);
        assert_eq!(state.seconds_left, 30);
        assert!(round.quiz_exp > now_ms());
        assert!(!state.round_solved);
    }

    #[test]
    fn test_next_round_resets_solved_flag() {
        let mut state = playing_room();
        let quiz = LocalQuizSource::new();
        let rules = GameRules::default();

        next_round(&mut state, &rules, &quiz).unwrap();
        state.apply_correct("Bo", 1);
        assert!(state.round_solved);

        next_round(&mut state, &rules, &quiz).unwrap();
        assert!(!state.round_solved);
    }

    #[test]
    fn test_advancing_rounds_keeps_one_live_token() {
        let mut state = playing_room();
        let quiz = LocalQuizSource::new();
        let rules = GameRules::default();

        for _ in 0..5 {
            next_round(&mut state, &rules, &quiz).unwrap();
            assert_eq!(quiz.issued_count(), 1);
        }
    }

    #[test]
    fn test_next_round_fails_without_content() {
        let mut state = playing_room();
        let quiz = LocalQuizSource::new();
        let rules = GameRules {
            level: 99,
            ..GameRules::default()
        };
        assert!(next_round(&mut state, &rules, &quiz).is_err());
    }
}
