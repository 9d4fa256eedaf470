//! Per-prompt join resolver.
//!
//! Joins one prompt's static content with the member's reflection responses
//! across two independent async sources and pushes a fresh [`JournalEntry`]
//! snapshot to the aggregator on every underlying change.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use thistle_core::services::{PromptContentService, ReflectionResponseService};
use thistle_core::{JournalEntry, Member, PromptContent, ReflectionResponse, SentPrompt};

/// The two halves of the join and their settle flags.
#[derive(Default)]
struct JoinState {
    content: Option<PromptContent>,
    content_settled: bool,
    responses: Vec<ReflectionResponse>,
    responses_settled: bool,
}

/// Lazily assembles the display-ready entry for one `prompt_id`.
///
/// Created on first sighting of a prompt id and kept for the aggregator's
/// lifetime; its identity is stable across re-merges even when the entry's
/// list position changes. The back-reference to the aggregator is a channel
/// sender, never an owning pointer.
pub struct JournalEntryData {
    sent_prompt: SentPrompt,
    member: Member,
    content_service: Arc<dyn PromptContentService>,
    response_service: Arc<dyn ReflectionResponseService>,
    join: RwLock<JoinState>,
    events: mpsc::UnboundedSender<JournalEntry>,
    started: AtomicBool,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    cancels: std::sync::Mutex<Vec<CancellationToken>>,
}

impl JournalEntryData {
    pub fn new(
        sent_prompt: SentPrompt,
        member: Member,
        content_service: Arc<dyn PromptContentService>,
        response_service: Arc<dyn ReflectionResponseService>,
        events: mpsc::UnboundedSender<JournalEntry>,
    ) -> Self {
        Self {
            sent_prompt,
            member,
            content_service,
            response_service,
            join: RwLock::new(JoinState::default()),
            events,
            started: AtomicBool::new(false),
            tasks: std::sync::Mutex::new(Vec::new()),
            cancels: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// The prompt id this resolver is keyed by.
    pub fn prompt_id(&self) -> &str {
        &self.sent_prompt.prompt_id
    }

    /// Kicks off the content fetch and the response subscription.
    ///
    /// Idempotent: a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(
            "Starting journal entry resolver for prompt {}",
            self.prompt_id()
        );

        let content_task = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_content_fetch().await })
        };

        let subscription = self
            .response_service
            .observe_for_prompt_id(&self.member, self.prompt_id());
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.push(subscription.cancel.clone());
        }
        let response_task = {
            let this = Arc::downgrade(self);
            tokio::spawn(async move {
                Self::run_response_subscription(this, subscription.receiver).await
            })
        };

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(content_task);
            tasks.push(response_task);
        }
    }

    /// Cancels both joins. Pending deliveries are dropped, not applied.
    pub fn stop(&self) {
        if let Ok(cancels) = self.cancels.lock() {
            for cancel in cancels.iter() {
                cancel.cancel();
            }
        }
        if let Ok(tasks) = self.tasks.lock() {
            for task in tasks.iter() {
                task.abort();
            }
        }
    }

    async fn run_content_fetch(self: Arc<Self>) {
        match self.content_service.get_by_prompt_id(self.prompt_id()).await {
            Ok(content) => {
                {
                    let mut join = self.join.write().await;
                    join.content = content;
                    join.content_settled = true;
                }
                self.emit().await;
            }
            Err(err) => {
                // No retry at this layer; the entry stays in its loading
                // state until the feed is rebuilt.
                tracing::error!(
                    "Failed to fetch content for prompt {}: {err}",
                    self.prompt_id()
                );
            }
        }
    }

    async fn run_response_subscription(
        this: std::sync::Weak<Self>,
        mut receiver: mpsc::UnboundedReceiver<
            Result<Vec<ReflectionResponse>, thistle_core::ThistleError>,
        >,
    ) {
        while let Some(delivery) = receiver.recv().await {
            let Some(data) = this.upgrade() else {
                return;
            };
            match delivery {
                Ok(responses) => {
                    {
                        let mut join = data.join.write().await;
                        join.responses = responses;
                        join.responses_settled = true;
                    }
                    data.emit().await;
                }
                Err(err) => {
                    tracing::error!(
                        "Response subscription error for prompt {}: {err}",
                        data.prompt_id()
                    );
                }
            }
        }
    }

    /// Builds the current joined snapshot.
    pub async fn journal_entry(&self) -> JournalEntry {
        let join = self.join.read().await;
        JournalEntry {
            prompt_id: self.sent_prompt.prompt_id.clone(),
            sent_prompt: self.sent_prompt.clone(),
            content: join.content.clone(),
            responses: join.responses.clone(),
            loading_complete: join.content_settled && join.responses_settled,
        }
    }

    /// True once both joins have delivered at least once.
    pub async fn loading_complete(&self) -> bool {
        let join = self.join.read().await;
        join.content_settled && join.responses_settled
    }

    /// Current responses for this prompt.
    pub async fn responses(&self) -> Vec<ReflectionResponse> {
        self.join.read().await.responses.clone()
    }

    async fn emit(&self) {
        let entry = self.journal_entry().await;
        // The aggregator may already be gone during teardown.
        let _ = self.events.send(entry);
    }
}

impl Drop for JournalEntryData {
    fn drop(&mut self) {
        self.stop();
    }
}
