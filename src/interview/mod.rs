pub mod parse;

pub use parse::interview_from_rows;

use serde::{Deserialize, Serialize};

/// Fallback per-question time limit when the backend supplies none.
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 120;

/// A loaded interview. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interview {
    pub interview_id: String,
    pub title: String,
    pub questions: Vec<Question>,
}

impl Interview {
    pub fn question(&self, idx: usize) -> Option<&Question> {
        self.questions.get(idx)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Overall completion percentage for the header bar.
    pub fn overall_pct(&self, current_idx: usize) -> u32 {
        if self.questions.is_empty() {
            return 0;
        }
        ((current_idx as f64 / self.questions.len() as f64) * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Seconds the candidate gets to answer.
    pub time_limit: u32,
}

/// Set once during setup; read-only afterwards within this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: String,
    pub name: String,
    pub email: String,
}
