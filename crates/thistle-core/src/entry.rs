//! Display-ready journal entry: the join of one prompt and its responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prompt::{PromptContent, SentPrompt};
use crate::response::ReflectionResponse;

/// One row of the journal feed.
///
/// Snapshots are value types: every recompute of the join produces a fresh
/// `JournalEntry`, and consumers (the session store, the UI) replace rather
/// than patch. Equality is by `prompt_id`, mirroring `SentPrompt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Stable prompt identifier, the feed's key for this row
    pub prompt_id: String,
    /// The prompt instance this entry renders
    pub sent_prompt: SentPrompt,
    /// Static prompt content, once fetched
    pub content: Option<PromptContent>,
    /// The member's reflections for this prompt
    pub responses: Vec<ReflectionResponse>,
    /// True once both the content fetch and the response subscription have
    /// each delivered at least once
    pub loading_complete: bool,
}

impl JournalEntry {
    /// The prompt's delivery timestamp.
    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_prompt.sent_at
    }

    /// True when the member has written at least one reflection.
    pub fn has_reflected(&self) -> bool {
        !self.responses.is_empty()
    }
}

impl PartialEq for JournalEntry {
    fn eq(&self, other: &Self) -> bool {
        self.prompt_id == other.prompt_id
    }
}

impl Eq for JournalEntry {}
