//! Collaborator service traits consumed by the feed engine.
//!
//! Backends are explicit dependencies injected into the feed aggregator so
//! tests and embedding hosts can swap implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ThistleError;
use crate::member::Member;
use crate::page::{PageCursor, PageResult};
use crate::prompt::{PromptContent, SentPrompt};
use crate::response::ReflectionResponse;

/// A live subscription to one prompt query window.
///
/// Snapshots arrive on `receiver` until the subscription is cancelled.
/// Cancelling the token is synchronous from the caller's point of view: the
/// producer must stop emitting once it observes the token, and the consumer
/// additionally guards against in-flight snapshots with its generation
/// counter.
pub struct PromptSubscription {
    pub receiver: mpsc::UnboundedReceiver<Result<PageResult<SentPrompt>, ThistleError>>,
    pub cancel: CancellationToken,
}

/// A live subscription to one prompt's response list.
pub struct ResponseSubscription {
    pub receiver: mpsc::UnboundedReceiver<Result<Vec<ReflectionResponse>, ThistleError>>,
    pub cancel: CancellationToken,
}

/// Live and one-shot access to the member's sent-prompt log.
#[async_trait]
pub trait PromptSubscriptionService: Send + Sync {
    /// Observes all prompts sent at or after `since`, unbounded.
    ///
    /// Delivers an initial snapshot and then a replacement snapshot on every
    /// change to the window.
    fn observe_future_prompts(&self, member: &Member, since: DateTime<Utc>) -> PromptSubscription;

    /// Observes one bounded backward page.
    ///
    /// The first page passes `before_or_equal_to`; continuation pages pass
    /// the previous page's `last_cursor` as `last_result` instead and
    /// continue strictly backward from it.
    fn observe_sent_prompts_page(
        &self,
        member: &Member,
        before_or_equal_to: Option<DateTime<Utc>>,
        limit: usize,
        last_result: Option<PageCursor>,
    ) -> PromptSubscription;

    /// One-shot query for up to `limit` prompts newer than `before`, newest
    /// first. `before = None` returns the newest prompts overall.
    async fn get_sent_prompts(
        &self,
        member: &Member,
        limit: usize,
        before: Option<PageCursor>,
    ) -> Result<Vec<SentPrompt>, ThistleError>;
}

/// Content-by-id fetch used by the entry join.
#[async_trait]
pub trait PromptContentService: Send + Sync {
    /// Fetches the static content for a prompt. `Ok(None)` is a definitive
    /// "no content exists" and settles the join.
    async fn get_by_prompt_id(&self, prompt_id: &str)
    -> Result<Option<PromptContent>, ThistleError>;
}

/// Response-list-by-prompt-id subscription used by the entry join.
pub trait ReflectionResponseService: Send + Sync {
    /// Observes the member's responses for one prompt. Delivers the current
    /// list immediately (possibly empty) and again on every change.
    fn observe_for_prompt_id(&self, member: &Member, prompt_id: &str) -> ResponseSubscription;
}
