//! Reflection response domain model and streak math.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One reflection a member wrote for a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionResponse {
    /// Unique response identifier
    pub id: String,
    /// Prompt this response answers
    pub prompt_id: String,
    /// Author member id
    pub member_id: String,
    /// Reflection text, markdown
    pub text: Option<String>,
    /// Time the member spent reflecting, in milliseconds
    pub reflection_duration_ms: Option<u64>,
    /// Last time this response was written
    pub updated_at: DateTime<Utc>,
}

impl ReflectionResponse {
    pub fn new(
        id: impl Into<String>,
        prompt_id: impl Into<String>,
        member_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt_id: prompt_id.into(),
            member_id: member_id.into(),
            text: None,
            reflection_duration_ms: None,
            updated_at: Utc::now(),
        }
    }
}

/// Counts the member's current consecutive-day reflection streak.
///
/// The streak is anchored at today (UTC): a day counts once it has at least
/// one response, and a not-yet-written today does not break a streak that ran
/// through yesterday.
pub fn calculate_streak(responses: &[ReflectionResponse]) -> usize {
    calculate_streak_at(responses, Utc::now())
}

/// Streak calculation with an explicit "now", so tests stay deterministic.
pub fn calculate_streak_at(responses: &[ReflectionResponse], now: DateTime<Utc>) -> usize {
    let mut days: Vec<NaiveDate> = responses.iter().map(|r| r.updated_at.date_naive()).collect();
    days.sort();
    days.dedup();

    let today = now.date_naive();
    let yesterday = today - Duration::days(1);
    let mut cursor = if days.binary_search(&today).is_ok() {
        today
    } else if days.binary_search(&yesterday).is_ok() {
        yesterday
    } else {
        return 0;
    };

    let mut streak = 0;
    while days.binary_search(&cursor).is_ok() {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}
