use serde::{Deserialize, Serialize};

/// Game-rule parameters. These are deliberately data, not code: the
/// scoring increment, the early-round-end rule (first correct guess)
/// and the game-end rule (a round expiring unsolved) live with the
/// server that owns them, and rooms only carry the numbers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GameRules {
    /// Time budget handed to every round, in seconds.
    pub round_seconds: u32,
    /// Score added for a correct guess.
    pub score_increment: u32,
    /// Difficulty level passed to the quiz source.
    pub level: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            round_seconds: 60,
            score_increment: 1,
            level: 1,
        }
    }
}
