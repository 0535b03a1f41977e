use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One timed unit of play. The server owns `seconds`; clients never
/// gate anything on their own clocks -- `quiz_exp` is the only
/// authority on whether a guess is still in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPayload {
    pub round_no: u32,
    pub quiz_id: String,
    pub quiz_token: Uuid,
    /// Epoch milliseconds. Guesses arriving after this are ignored
    /// regardless of correctness.
    pub quiz_exp: i64,
    pub seconds: u32,
    pub level: u32,
}

impl RoundPayload {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.quiz_exp
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
