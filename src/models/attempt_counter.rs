use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_ATTEMPTS: i32 = 3;

/// Per-candidate attempt record. Created lazily on first start, reset to
/// zero by an admin re-assignment, forced to the maximum on a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptCounter {
    pub email: String,
    pub attempts_used: i32,
    pub passed: bool,
    pub pass_date: Option<DateTime<Utc>>,
    pub final_score: Option<f64>,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl AttemptCounter {
    pub fn new(email: String) -> Self {
        Self {
            email,
            attempts_used: 0,
            passed: false,
            pass_date: None,
            final_score: None,
            last_attempt: None,
        }
    }

    pub fn remaining(&self) -> i32 {
        (MAX_ATTEMPTS - self.attempts_used).max(0)
    }

    /// Passing is one-way terminal: a passed candidate never re-sits,
    /// regardless of the remaining count.
    pub fn can_attempt(&self) -> bool {
        !self.passed && self.remaining() > 0
    }
}
