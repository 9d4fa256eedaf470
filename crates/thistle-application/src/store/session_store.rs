//! Process-wide reactive store that owns the journal feed.
//!
//! One [`JournalFeedDataSource`] per authenticated member: a member change
//! (including logout followed by a different login) tears the previous feed
//! down completely before the replacement subscribes, so no state crosses
//! member boundaries.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use thistle_core::{AppSettings, JournalEntry, Member};

use crate::feed::FeedServices;
use crate::feed::data_source::JournalFeedDataSource;
use crate::feed::delegate::JournalFeedDelegate;

/// A caller-supplied action that needs a resolved member identity.
///
/// Queued until a member is available, then run exactly once, FIFO, and
/// discarded. Not persisted.
pub type PendingAction = Box<dyn FnOnce(Member) + Send + 'static>;

/// Owns the feed lifecycle and re-publishes feed-derived state to the UI.
///
/// Every projection is an independently observable [`watch`] channel;
/// consumers subscribe to the slices they render and never receive a mutable
/// reference into feed state.
pub struct SessionStore {
    services: FeedServices,
    settings: std::sync::RwLock<AppSettings>,
    member: RwLock<Option<Member>>,
    feed: RwLock<Option<Arc<JournalFeedDataSource>>>,
    pending_actions: std::sync::Mutex<VecDeque<PendingAction>>,
    auth_task: std::sync::Mutex<Option<JoinHandle<()>>>,

    auth_loaded: watch::Sender<bool>,
    journal_entries: watch::Sender<Vec<JournalEntry>>,
    journal_loaded: watch::Sender<bool>,
    today_entry: watch::Sender<Option<JournalEntry>>,
    onboarding_entry: watch::Sender<Option<JournalEntry>>,
    show_onboarding: watch::Sender<bool>,
}

impl SessionStore {
    pub fn new(services: FeedServices, settings: AppSettings) -> Arc<Self> {
        let (auth_loaded, _) = watch::channel(false);
        let (journal_entries, _) = watch::channel(Vec::new());
        let (journal_loaded, _) = watch::channel(false);
        let (today_entry, _) = watch::channel(None);
        let (onboarding_entry, _) = watch::channel(None);
        let (show_onboarding, _) = watch::channel(false);
        Arc::new(Self {
            services,
            settings: std::sync::RwLock::new(settings),
            member: RwLock::new(None),
            feed: RwLock::new(None),
            pending_actions: std::sync::Mutex::new(VecDeque::new()),
            auth_task: std::sync::Mutex::new(None),
            auth_loaded,
            journal_entries,
            journal_loaded,
            today_entry,
            onboarding_entry,
            show_onboarding,
        })
    }

    /// Binds the store to an auth stream.
    ///
    /// The current value is applied immediately, then every member change
    /// rebinds the feed. `auth_loaded` flips true after the first delivery.
    pub fn start(self: &Arc<Self>, mut member_rx: watch::Receiver<Option<Member>>) {
        let this = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            loop {
                let member = member_rx.borrow_and_update().clone();
                let Some(store) = this.upgrade() else {
                    return;
                };
                store.handle_member_change(member).await;
                store.auth_loaded.send_replace(true);
                drop(store);
                if member_rx.changed().await.is_err() {
                    return;
                }
            }
        });
        if let Ok(mut slot) = self.auth_task.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    /// Rebinds the feed when the session owner changes.
    ///
    /// Same account: only the stored profile is refreshed. Different account
    /// (or logout): the old feed is reset synchronously, all projections are
    /// cleared, and a fresh feed starts for the new member, after which any
    /// queued auth actions run.
    pub async fn handle_member_change(self: &Arc<Self>, member: Option<Member>) {
        let previous = self.member.read().await.clone();
        let same_account = match (&previous, &member) {
            (Some(a), Some(b)) => a.same_account(b),
            (None, None) => true,
            _ => false,
        };
        if same_account {
            *self.member.write().await = member.clone();
            if let Some(feed) = self.feed.read().await.clone() {
                feed.set_member(member).await;
            }
            self.run_pending_actions().await;
            return;
        }

        tracing::info!(
            "Member changed ({} -> {}), rebinding journal feed",
            previous.as_ref().map(|m| m.id.as_str()).unwrap_or("none"),
            member.as_ref().map(|m| m.id.as_str()).unwrap_or("none"),
        );

        // Take the old feed out of the slot before resetting so its final
        // data_loaded callback reads an empty store.
        let old_feed = self.feed.write().await.take();
        if let Some(old_feed) = old_feed {
            old_feed.reset().await;
        }
        *self.member.write().await = member.clone();

        self.journal_loaded.send_replace(false);
        self.show_onboarding.send_replace(false);
        self.journal_entries.send_replace(Vec::new());
        self.today_entry.send_replace(None);
        self.onboarding_entry.send_replace(None);

        if let Some(member) = member {
            let settings = self.settings();
            let feed = Arc::new(JournalFeedDataSource::with_settings(
                Some(member),
                self.services.clone(),
                &settings,
            ));
            let delegate: Arc<dyn JournalFeedDelegate> = Arc::clone(self) as _;
            feed.set_delegate(Arc::downgrade(&delegate));
            *self.feed.write().await = Some(Arc::clone(&feed));
            feed.start().await;
            self.run_pending_actions().await;
        }
    }

    /// Logs the member out: tears down the feed and clears every projection.
    pub async fn logout(self: &Arc<Self>) {
        self.handle_member_change(None).await;
    }

    /// Queues an action that needs a member; runs it immediately when one is
    /// already resolved.
    pub async fn add_auth_action(&self, action: PendingAction) {
        if let Ok(mut queue) = self.pending_actions.lock() {
            queue.push_back(action);
        }
        self.run_pending_actions().await;
    }

    async fn run_pending_actions(&self) {
        let Some(member) = self.member.read().await.clone() else {
            return;
        };
        loop {
            let action = self
                .pending_actions
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front());
            let Some(action) = action else {
                break;
            };
            action(member.clone());
        }
    }

    /// Detaches from the auth stream and tears the feed down.
    pub async fn stop(&self) {
        if let Ok(mut slot) = self.auth_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        let feed = self.feed.write().await.take();
        if let Some(feed) = feed {
            feed.reset().await;
        }
    }

    /// Replaces the app settings; applies to feeds created afterwards.
    pub fn update_settings(&self, settings: AppSettings) {
        if let Ok(mut slot) = self.settings.write() {
            *slot = settings;
        }
    }

    fn settings(&self) -> AppSettings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// The currently bound feed, if a member is signed in.
    pub async fn feed(&self) -> Option<Arc<JournalFeedDataSource>> {
        self.feed.read().await.clone()
    }

    /// The current member, if resolved.
    pub async fn member(&self) -> Option<Member> {
        self.member.read().await.clone()
    }

    // ------------------------------------------------------------------
    // Observable projections
    // ------------------------------------------------------------------

    pub fn subscribe_auth_loaded(&self) -> watch::Receiver<bool> {
        self.auth_loaded.subscribe()
    }

    pub fn subscribe_journal_entries(&self) -> watch::Receiver<Vec<JournalEntry>> {
        self.journal_entries.subscribe()
    }

    pub fn subscribe_journal_loaded(&self) -> watch::Receiver<bool> {
        self.journal_loaded.subscribe()
    }

    pub fn subscribe_today_entry(&self) -> watch::Receiver<Option<JournalEntry>> {
        self.today_entry.subscribe()
    }

    pub fn subscribe_onboarding_entry(&self) -> watch::Receiver<Option<JournalEntry>> {
        self.onboarding_entry.subscribe()
    }

    pub fn subscribe_show_onboarding(&self) -> watch::Receiver<bool> {
        self.show_onboarding.subscribe()
    }

    /// Current entry list snapshot.
    pub fn journal_entries(&self) -> Vec<JournalEntry> {
        self.journal_entries.borrow().clone()
    }

    /// Recomputes the derived projections by scanning the mirror list.
    ///
    /// Today's entry is the first whose prompt was sent on the current UTC
    /// day; the onboarding entry is the chronologically earliest known one
    /// (the tail of the descending canonical order).
    fn refresh_derived(&self) {
        let entries = self.journal_entries.borrow().clone();
        let today = Utc::now().date_naive();
        let today_entry = entries
            .iter()
            .find(|entry| entry.sent_at().date_naive() == today)
            .cloned();
        let onboarding_entry = entries.last().cloned();
        self.today_entry.send_replace(today_entry);
        self.onboarding_entry.send_replace(onboarding_entry);
    }
}

#[async_trait]
impl JournalFeedDelegate for SessionStore {
    async fn update_entry(&self, entry: JournalEntry, index: Option<usize>) {
        self.journal_entries.send_modify(|list| {
            let position = index
                .filter(|i| *i < list.len())
                .or_else(|| list.iter().position(|e| e.prompt_id == entry.prompt_id));
            if let Some(position) = position {
                list[position] = entry;
            }
        });
        self.refresh_derived();
    }

    async fn insert_items(&self, indexes: &[usize]) {
        let Some(feed) = self.feed.read().await.clone() else {
            return;
        };
        let mut additions: Vec<(usize, JournalEntry)> = Vec::new();
        for &index in indexes {
            if let Some(entry) = feed.get(index).await {
                additions.push((index, entry));
            }
        }
        self.journal_entries.send_modify(|list| {
            for (index, entry) in additions {
                if index <= list.len() {
                    list.insert(index, entry);
                }
            }
        });
        self.refresh_derived();
    }

    async fn remove_items(&self, indexes: &[usize]) {
        let mut descending: Vec<usize> = indexes.to_vec();
        descending.sort_unstable_by(|a, b| b.cmp(a));
        self.journal_entries.send_modify(|list| {
            for index in descending {
                if index < list.len() {
                    list.remove(index);
                }
            }
        });
        self.refresh_derived();
    }

    async fn batch_update(&self, added: &[usize], removed: &[usize]) {
        self.remove_items(removed).await;
        self.insert_items(added).await;
    }

    async fn data_loaded(&self) {
        let feed = self.feed.read().await.clone();
        let entries = match feed {
            Some(feed) => feed.entries().await,
            None => Vec::new(),
        };
        self.journal_entries.send_replace(entries);
        self.refresh_derived();
    }

    async fn handle_empty_state(&self, has_results: bool) {
        self.show_onboarding.send_replace(!has_results);
        self.journal_loaded.send_replace(true);
        if !has_results {
            self.journal_entries.send_replace(Vec::new());
            self.refresh_derived();
        }
    }
}
