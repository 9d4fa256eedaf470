//! In-memory sent-prompt log with live window subscriptions.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use thistle_core::services::{PromptSubscription, PromptSubscriptionService};
use thistle_core::{Member, PageCursor, PageResult, SentPrompt, ThistleError};

/// One query window a subscriber is watching.
#[derive(Clone)]
enum Window {
    /// Everything at or after `since`, unbounded.
    Future { since: DateTime<Utc> },
    /// One bounded backward page.
    Page {
        before_or_equal_to: Option<DateTime<Utc>>,
        continue_before: Option<DateTime<Utc>>,
        limit: usize,
    },
}

struct PageWatcher {
    member_id: String,
    window: Window,
    tx: mpsc::UnboundedSender<Result<PageResult<SentPrompt>, ThistleError>>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct PromptLog {
    /// All prompts, newest first.
    prompts: Vec<SentPrompt>,
    watchers: Vec<PageWatcher>,
}

/// In-memory [`PromptSubscriptionService`].
///
/// Every mutation re-evaluates all live windows and re-emits a full
/// snapshot to each, mirroring the snapshot-per-callback contract of the
/// real backend.
#[derive(Default)]
pub struct MemoryPromptService {
    inner: std::sync::RwLock<PromptLog>,
    /// When true, new subscriptions do not receive their initial snapshot
    /// until [`flush`](Self::flush) is called. Lets tests observe the
    /// "window still awaiting first result" states.
    hold_deliveries: AtomicBool,
}

impl MemoryPromptService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends or resumes snapshot delivery for new subscriptions.
    pub fn hold_deliveries(&self, hold: bool) {
        self.hold_deliveries.store(hold, Ordering::SeqCst);
    }

    /// Re-emits the current snapshot to every live window.
    pub fn flush(&self) {
        if let Ok(mut log) = self.inner.write() {
            Self::broadcast(&mut log);
        }
    }

    /// Records a prompt and notifies every window it lands in.
    pub fn add_prompt(&self, prompt: SentPrompt) {
        if let Ok(mut log) = self.inner.write() {
            Self::insert_sorted(&mut log.prompts, prompt);
            Self::broadcast(&mut log);
        }
    }

    /// Records a prompt without notifying live windows.
    ///
    /// Simulates backend writes the live subscriptions missed; such prompts
    /// are only discoverable through the one-shot "check for new" query.
    pub fn add_prompt_silently(&self, prompt: SentPrompt) {
        if let Ok(mut log) = self.inner.write() {
            Self::insert_sorted(&mut log.prompts, prompt);
        }
    }

    /// Deletes a prompt by id and re-emits to every window it was part of.
    ///
    /// A bounded window that was truncated at its limit backfills from the
    /// prompts behind it, so one deletion can shrink and shift a window in
    /// the same snapshot.
    pub fn remove_prompt(&self, prompt_id: &str) {
        if let Ok(mut log) = self.inner.write() {
            let Some(position) = log.prompts.iter().position(|p| p.prompt_id == prompt_id) else {
                return;
            };
            log.prompts.remove(position);
            Self::broadcast(&mut log);
        }
    }

    fn insert_sorted(prompts: &mut Vec<SentPrompt>, prompt: SentPrompt) {
        let position = prompts
            .iter()
            .position(|existing| existing.sent_at < prompt.sent_at)
            .unwrap_or(prompts.len());
        prompts.insert(position, prompt);
    }

    fn broadcast(log: &mut PromptLog) {
        let prompts = log.prompts.clone();
        log.watchers.retain(|watcher| {
            if watcher.cancel.is_cancelled() {
                return false;
            }
            let snapshot = Self::evaluate(&watcher.window, &watcher.member_id, &prompts);
            watcher.tx.send(Ok(snapshot)).is_ok()
        });
    }

    fn evaluate(window: &Window, member_id: &str, prompts: &[SentPrompt]) -> PageResult<SentPrompt> {
        let mine = prompts.iter().filter(|p| p.member_id == member_id);
        match window {
            Window::Future { since } => {
                let results: Vec<SentPrompt> =
                    mine.filter(|p| p.sent_at >= *since).cloned().collect();
                Self::snapshot(results, false)
            }
            Window::Page {
                before_or_equal_to,
                continue_before,
                limit,
            } => {
                let filtered: Vec<&SentPrompt> = mine
                    .filter(|p| before_or_equal_to.map(|b| p.sent_at <= b).unwrap_or(true))
                    .filter(|p| continue_before.map(|c| p.sent_at < c).unwrap_or(true))
                    .collect();
                let might_have_more = filtered.len() > *limit;
                let results: Vec<SentPrompt> =
                    filtered.into_iter().take(*limit).cloned().collect();
                Self::snapshot(results, might_have_more)
            }
        }
    }

    fn snapshot(results: Vec<SentPrompt>, might_have_more: bool) -> PageResult<SentPrompt> {
        PageResult {
            first_cursor: results.first().map(|p| PageCursor(p.sent_at)),
            last_cursor: results.last().map(|p| PageCursor(p.sent_at)),
            might_have_more,
            results: Some(results),
        }
    }

    fn subscribe(&self, member: &Member, window: Window) -> PromptSubscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        if let Ok(mut log) = self.inner.write() {
            if !self.hold_deliveries.load(Ordering::SeqCst) {
                let snapshot = Self::evaluate(&window, &member.id, &log.prompts);
                let _ = tx.send(Ok(snapshot));
            }
            log.watchers.push(PageWatcher {
                member_id: member.id.clone(),
                window,
                tx,
                cancel: cancel.clone(),
            });
        }
        PromptSubscription { receiver, cancel }
    }
}

#[async_trait]
impl PromptSubscriptionService for MemoryPromptService {
    fn observe_future_prompts(&self, member: &Member, since: DateTime<Utc>) -> PromptSubscription {
        self.subscribe(member, Window::Future { since })
    }

    fn observe_sent_prompts_page(
        &self,
        member: &Member,
        before_or_equal_to: Option<DateTime<Utc>>,
        limit: usize,
        last_result: Option<PageCursor>,
    ) -> PromptSubscription {
        self.subscribe(
            member,
            Window::Page {
                before_or_equal_to,
                continue_before: last_result.map(|cursor| cursor.0),
                limit,
            },
        )
    }

    async fn get_sent_prompts(
        &self,
        member: &Member,
        limit: usize,
        before: Option<PageCursor>,
    ) -> Result<Vec<SentPrompt>, ThistleError> {
        let log = self
            .inner
            .read()
            .map_err(|_| ThistleError::Internal("prompt log lock poisoned".to_string()))?;
        Ok(log
            .prompts
            .iter()
            .filter(|p| p.member_id == member.id)
            .filter(|p| before.map(|cursor| p.sent_at > cursor.0).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }
}
