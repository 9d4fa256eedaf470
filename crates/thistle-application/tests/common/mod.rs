//! Shared test harness: in-memory backends plus a recording delegate.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use thistle_application::feed::FeedServices;
use thistle_application::feed::data_source::JournalFeedDataSource;
use thistle_application::feed::delegate::JournalFeedDelegate;
use thistle_core::{JournalEntry, Member, SentPrompt};
use thistle_infrastructure::{MemoryContentService, MemoryPromptService, MemoryResponseService};

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Update {
        prompt_id: String,
        index: Option<usize>,
    },
    Insert(Vec<usize>),
    Remove(Vec<usize>),
    Batch {
        added: Vec<usize>,
        removed: Vec<usize>,
    },
    DataLoaded,
    EmptyState(bool),
}

/// Delegate that records every notification in arrival order.
#[derive(Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<FeedEvent>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<FeedEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn as_weak(self: &Arc<Self>) -> Weak<dyn JournalFeedDelegate> {
        let strong: Arc<dyn JournalFeedDelegate> = Arc::clone(self) as _;
        Arc::downgrade(&strong)
    }

    fn push(&self, event: FeedEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

#[async_trait]
impl JournalFeedDelegate for RecordingDelegate {
    async fn update_entry(&self, entry: JournalEntry, index: Option<usize>) {
        self.push(FeedEvent::Update {
            prompt_id: entry.prompt_id,
            index,
        });
    }

    async fn insert_items(&self, indexes: &[usize]) {
        self.push(FeedEvent::Insert(indexes.to_vec()));
    }

    async fn remove_items(&self, indexes: &[usize]) {
        self.push(FeedEvent::Remove(indexes.to_vec()));
    }

    async fn batch_update(&self, added: &[usize], removed: &[usize]) {
        self.push(FeedEvent::Batch {
            added: added.to_vec(),
            removed: removed.to_vec(),
        });
    }

    async fn data_loaded(&self) {
        self.push(FeedEvent::DataLoaded);
    }

    async fn handle_empty_state(&self, has_results: bool) {
        self.push(FeedEvent::EmptyState(has_results));
    }
}

pub struct Harness {
    pub prompts: Arc<MemoryPromptService>,
    pub content: Arc<MemoryContentService>,
    pub responses: Arc<MemoryResponseService>,
    pub member: Member,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            prompts: Arc::new(MemoryPromptService::new()),
            content: Arc::new(MemoryContentService::new()),
            responses: Arc::new(MemoryResponseService::new()),
            member: Member::new("m-1", "m@thistle.app"),
        }
    }

    pub fn services(&self) -> FeedServices {
        FeedServices {
            prompts: Arc::clone(&self.prompts) as _,
            content: Arc::clone(&self.content) as _,
            responses: Arc::clone(&self.responses) as _,
        }
    }

    /// A prompt for the harness member, sent `minutes_ago` minutes in the
    /// past.
    pub fn prompt_minutes_ago(&self, id: &str, minutes_ago: i64) -> SentPrompt {
        SentPrompt::new(
            id,
            self.member.id.clone(),
            Utc::now() - ChronoDuration::minutes(minutes_ago),
        )
    }

    pub fn prompt_at(&self, id: &str, sent_at: DateTime<Utc>) -> SentPrompt {
        SentPrompt::new(id, self.member.id.clone(), sent_at)
    }
}

/// Polls until the feed's canonical order has `expected` entries.
pub async fn wait_for_count(feed: &Arc<JournalFeedDataSource>, expected: usize) {
    for _ in 0..400 {
        if feed.count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "feed never reached {expected} entries (at {})",
        feed.count().await
    );
}

/// Polls until the recorded event log satisfies `predicate`.
pub async fn wait_for_events<F>(delegate: &Arc<RecordingDelegate>, predicate: F, what: &str)
where
    F: Fn(&[FeedEvent]) -> bool,
{
    for _ in 0..400 {
        if predicate(&delegate.events()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}; events: {:?}", delegate.events());
}

/// Lets in-flight subscription deliveries settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
