use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;
use uuid::Uuid;

/// Quiz reference handed to a round: an opaque item id plus a token
/// that must be presented back on every correctness check.
#[derive(Debug, Clone)]
pub struct QuizItem {
    pub id: String,
    pub token: Uuid,
}

/// Boundary to the quiz-content collaborator. Rooms never see answers,
/// only ids and tokens.
pub trait QuizSource: Send + Sync {
    fn available(&self, level: u32) -> bool;
    fn issue(&self, level: u32) -> Option<QuizItem>;
    fn check(&self, id: &str, token: &Uuid, guess: &str) -> bool;
    /// Invalidate a token once its round is superseded or the room is
    /// gone. Checks against a retired token fail.
    fn retire(&self, token: &Uuid);
}

struct BankEntry {
    id: &'static str,
    level: u32,
    answer: &'static str,
}

const BANK: &[BankEntry] = &[
    BankEntry { id: "dog-001", level: 1, answer: "corgi" },
    BankEntry { id: "dog-002", level: 1, answer: "beagle" },
    BankEntry { id: "dog-003", level: 1, answer: "poodle" },
    BankEntry { id: "dog-004", level: 1, answer: "husky" },
    BankEntry { id: "dog-005", level: 1, answer: "shiba" },
    BankEntry { id: "dog-101", level: 2, answer: "samoyed" },
    BankEntry { id: "dog-102", level: 2, answer: "whippet" },
    BankEntry { id: "dog-103", level: 2, answer: "vizsla" },
];

/// In-process quiz bank. The original deployment called out to a quiz
/// service over HTTP; that service lived in the same process, so the
/// trait seam is kept and the transport is not.
pub struct LocalQuizSource {
    issued: Mutex<HashMap<Uuid, String>>,
}

impl LocalQuizSource {
    pub fn new() -> Self {
        Self {
            issued: Mutex::new(HashMap::new()),
        }
    }

    fn issued_lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, String>> {
        self.issued.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn issued_count(&self) -> usize {
        self.issued_lock().len()
    }
}

impl Default for LocalQuizSource {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizSource for LocalQuizSource {
    fn available(&self, level: u32) -> bool {
        BANK.iter().any(|e| e.level == level)
    }

    fn issue(&self, level: u32) -> Option<QuizItem> {
        let candidates: Vec<&BankEntry> = BANK.iter().filter(|e| e.level == level).collect();
        if candidates.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..candidates.len());
        let entry = candidates[idx];
        let token = Uuid::new_v4();
        self.issued_lock().insert(token, entry.id.to_string());
        Some(QuizItem {
            id: entry.id.to_string(),
            token,
        })
    }

    fn check(&self, id: &str, token: &Uuid, guess: &str) -> bool {
        // The token must have been issued for exactly this item.
        match self.issued_lock().get(token) {
            Some(issued_id) if issued_id == id => {}
            _ => return false,
        }
        BANK.iter()
            .find(|e| e.id == id)
            .map(|e| e.answer.eq_ignore_ascii_case(guess.trim()))
            .unwrap_or(false)
    }

    fn retire(&self, token: &Uuid) {
        self.issued_lock().remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_check_correct() {
        let quiz = LocalQuizSource::new();
        let item = quiz.issue(1).unwrap();
        let answer = BANK.iter().find(|e| e.id == item.id).unwrap().answer;
        assert!(quiz.check(&item.id, &item.token, answer));
        assert!(quiz.check(&item.id, &item.token, &format!("  {}  ", answer.to_uppercase())));
    }

    #[test]
    fn test_wrong_guess_fails() {
        let quiz = LocalQuizSource::new();
        let item = quiz.issue(1).unwrap();
        assert!(!quiz.check(&item.id, &item.token, "not-a-dog"));
    }

    #[test]
    fn test_unissued_token_fails() {
        let quiz = LocalQuizSource::new();
        let item = quiz.issue(1).unwrap();
        let answer = BANK.iter().find(|e| e.id == item.id).unwrap().answer;
        assert!(!quiz.check(&item.id, &Uuid::new_v4(), answer));
    }

    #[test]
    fn test_token_bound_to_item() {
        let quiz = LocalQuizSource::new();
        let item = quiz.issue(1).unwrap();
        let other = BANK.iter().find(|e| e.id != item.id).unwrap();
        assert!(!quiz.check(other.id, &item.token, other.answer));
    }

    #[test]
    fn test_retired_token_fails_check() {
        let quiz = LocalQuizSource::new();
        let item = quiz.issue(1).unwrap();
        let answer = BANK.iter().find(|e| e.id == item.id).unwrap().answer;
        assert!(quiz.check(&item.id, &item.token, answer));

        quiz.retire(&item.token);
        assert!(!quiz.check(&item.id, &item.token, answer));
        assert_eq!(quiz.issued_count(), 0);
    }

    #[test]
    fn test_availability_by_level() {
        let quiz = LocalQuizSource::new();
        assert!(quiz.available(1));
        assert!(quiz.available(2));
        assert!(!quiz.available(99));
        assert!(quiz.issue(99).is_none());
    }
}
