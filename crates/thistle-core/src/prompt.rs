//! Prompt domain models.
//!
//! A `SentPrompt` is one prompt instance delivered to a member at a point in
//! time; `PromptContent` is the static content (question text, media) joined
//! into a journal entry by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of one prompt sent to a member.
///
/// Arrives via subscription and is never mutated by the feed engine.
/// Equality is by `prompt_id` only: the same prompt reported by two query
/// windows is the same record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentPrompt {
    /// Stable prompt identifier (the feed's dedupe key)
    pub prompt_id: String,
    /// Member this prompt was sent to
    pub member_id: String,
    /// Delivery timestamp, the feed's ordering key
    pub sent_at: DateTime<Utc>,
}

impl SentPrompt {
    pub fn new(
        prompt_id: impl Into<String>,
        member_id: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            member_id: member_id.into(),
            sent_at,
        }
    }
}

impl PartialEq for SentPrompt {
    fn eq(&self, other: &Self) -> bool {
        self.prompt_id == other.prompt_id
    }
}

impl Eq for SentPrompt {}

/// Static content for one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContent {
    /// Content entry identifier in the CMS
    pub entry_id: String,
    /// The prompt this content belongs to
    pub prompt_id: String,
    /// Short subject line shown in the feed cell
    pub subject: Option<String>,
    /// The question text, markdown
    pub text: Option<String>,
    /// Optional hero image or video URL
    pub media_url: Option<String>,
}

impl PromptContent {
    pub fn new(entry_id: impl Into<String>, prompt_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            prompt_id: prompt_id.into(),
            subject: None,
            text: None,
            media_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sent_prompt_equality_by_id() {
        let t1 = Utc::now();
        let t2 = t1 - chrono::Duration::hours(1);
        let a = SentPrompt::new("p-1", "m-1", t1);
        let b = SentPrompt::new("p-1", "m-2", t2);
        assert_eq!(a, b);
    }
}
