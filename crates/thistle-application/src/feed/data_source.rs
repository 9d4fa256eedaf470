//! The feed aggregator.
//!
//! Fans N live query windows into one deduplicated, time-descending list of
//! prompt ids, creates one [`JournalEntryData`] resolver per id, computes
//! minimal insert/remove diffs on every window delivery, and drives its
//! delegate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use thistle_core::{JournalEntry, Member, PageResult, ReflectionResponse, SentPrompt};

use super::FeedServices;
use super::delegate::JournalFeedDelegate;
use super::entry_data::JournalEntryData;
use super::page_loader::PageLoader;

/// Pending delegate notification, computed under the state lock and
/// dispatched after it is released.
enum FeedNotification {
    EmptyState { has_results: bool },
    Insert(Vec<usize>),
    Remove(Vec<usize>),
    Batch { added: Vec<usize>, removed: Vec<usize> },
    DataLoaded,
}

/// Everything the aggregator mutates, guarded by one writer lock.
///
/// All subscription callbacks funnel their mutations through this single
/// lock; the diff algorithm is not safe under concurrent mutation.
#[derive(Default)]
struct FeedState {
    has_started: bool,
    has_loaded: bool,
    pages: Vec<PageLoader>,
    /// Prompts discovered by the manual "check for new" query; merged ahead
    /// of the window results on every reconfigure.
    fresh_prompts: Vec<SentPrompt>,
    /// Flattened window results, fresh prompts first.
    sent_prompts: Vec<SentPrompt>,
    /// The canonical, deduplicated order the UI renders.
    ordered_prompt_ids: Vec<String>,
    /// Resolver per prompt id. Entries are only removed on full reset, so a
    /// resolver's identity is stable for the aggregator's lifetime.
    entries_by_prompt_id: HashMap<String, Arc<JournalEntryData>>,
}

impl FeedState {
    /// Loading while the initial windows are opening, or while any open
    /// window still awaits its first snapshot.
    fn is_loading(&self) -> bool {
        if self.pages.is_empty() {
            !self.has_loaded
        } else {
            self.pages.iter().any(|page| !page.finished_loading())
        }
    }

    fn flatten(&self) -> Vec<SentPrompt> {
        self.fresh_prompts
            .iter()
            .cloned()
            .chain(
                self.pages
                    .iter()
                    .filter_map(|page| page.result.as_ref())
                    .filter_map(|result| result.results.as_ref())
                    .flatten()
                    .cloned(),
            )
            .collect()
    }
}

/// Paginated, multi-window, live-updating journal feed.
///
/// Owns the canonical prompt order and the id-to-resolver map exclusively;
/// consumers only ever receive cloned snapshots or indices.
pub struct JournalFeedDataSource {
    services: FeedServices,
    page_size: usize,
    check_for_new_limit: usize,
    member: RwLock<Option<Member>>,
    delegate: std::sync::RwLock<Option<Weak<dyn JournalFeedDelegate>>>,
    state: Arc<RwLock<FeedState>>,
    /// Bumped on reset. Page drain tasks carry the generation they were
    /// spawned under; snapshots from a superseded generation are discarded
    /// silently, so teardown races can never corrupt current state.
    generation: AtomicU64,
    entry_events: mpsc::UnboundedSender<JournalEntry>,
    entry_events_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<JournalEntry>>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl JournalFeedDataSource {
    pub fn new(member: Option<Member>, services: FeedServices) -> Self {
        Self::with_settings(member, services, &thistle_core::AppSettings::default())
    }

    pub fn with_settings(
        member: Option<Member>,
        services: FeedServices,
        settings: &thistle_core::AppSettings,
    ) -> Self {
        let (entry_events, entry_events_rx) = mpsc::unbounded_channel();
        Self {
            services,
            page_size: settings.page_size,
            check_for_new_limit: settings.check_for_new_limit,
            member: RwLock::new(member),
            delegate: std::sync::RwLock::new(None),
            state: Arc::new(RwLock::new(FeedState::default())),
            generation: AtomicU64::new(0),
            entry_events,
            entry_events_rx: std::sync::Mutex::new(Some(entry_events_rx)),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Sets the delegate. Held weakly; the owner outlives the feed.
    pub fn set_delegate(&self, delegate: Weak<dyn JournalFeedDelegate>) {
        if let Ok(mut slot) = self.delegate.write() {
            *slot = Some(delegate);
        }
    }

    /// Replaces the member identity (profile refreshes from the auth layer).
    pub async fn set_member(&self, member: Option<Member>) {
        *self.member.write().await = member;
    }

    /// Opens the initial windows: the unbounded future window and the first
    /// bounded backward page, concurrently.
    ///
    /// Idempotent. A missing member or a repeated call is a logged no-op.
    pub async fn start(self: &Arc<Self>) {
        let Some(member) = self.member.read().await.clone() else {
            tracing::info!("No member found, not starting journal feed");
            return;
        };
        {
            let mut state = self.state.write().await;
            if state.has_started {
                tracing::warn!("Journal feed has already been started, returning");
                return;
            }
            state.has_started = true;
        }
        tracing::info!("Starting journal feed for member {}", member.id);

        let receiver = self
            .entry_events_rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(receiver) = receiver {
            let this = Arc::downgrade(self);
            let generation = self.generation.load(Ordering::SeqCst);
            let task =
                tokio::spawn(
                    async move { Self::run_entry_events(this, generation, receiver).await },
                );
            if let Ok(mut tasks) = self.tasks.lock() {
                tasks.push(task);
            }
        }

        let start_date = Utc::now();
        let generation = self.generation.load(Ordering::SeqCst);

        // Future window: everything at or after start, unbounded.
        let future = self.services.prompts.observe_future_prompts(&member, start_date);
        // First backward page: bounded, at or before start.
        let first = self.services.prompts.observe_sent_prompts_page(
            &member,
            Some(start_date),
            self.page_size,
            None,
        );

        let mut state = self.state.write().await;
        state.pages.insert(0, PageLoader::new(future.cancel.clone()));
        let future_task = {
            let this = Arc::downgrade(self);
            let receiver = future.receiver;
            tokio::spawn(async move {
                Self::run_page_subscription(this, generation, 0, receiver, false).await
            })
        };
        state.pages[0].attach_task(future_task);

        state.pages.insert(1, PageLoader::new(first.cancel.clone()));
        let first_task = {
            let this = Arc::downgrade(self);
            let receiver = first.receiver;
            tokio::spawn(async move {
                Self::run_page_subscription(this, generation, 1, receiver, true).await
            })
        };
        state.pages[1].attach_task(first_task);
    }

    /// Opens one more backward page, continuing from the last page's cursor.
    ///
    /// No-op while any open page still awaits its first snapshot (guards
    /// against overlapping in-flight page creation) or when no member is
    /// set.
    pub async fn load_next_page(self: &Arc<Self>) {
        tracing::info!("Attempting to load next page");
        let Some(member) = self.member.read().await.clone() else {
            tracing::warn!("No current member found, can't load next page");
            return;
        };

        let mut state = self.state.write().await;
        if state.is_loading() {
            tracing::info!("Already loading more, can't fetch next page");
            return;
        }
        let next_index = state.pages.len();
        let previous = state.pages.last().and_then(|page| page.result.clone());
        if previous.is_none() && next_index != 0 {
            tracing::info!("Page hasn't finished loading yet, can't fetch next page");
            return;
        }

        tracing::info!("Creating page loader. This will be page {next_index}");
        let generation = self.generation.load(Ordering::SeqCst);
        let last_cursor = previous.and_then(|result| result.last_cursor);
        let subscription = self.services.prompts.observe_sent_prompts_page(
            &member,
            None,
            self.page_size,
            last_cursor,
        );
        state.pages.push(PageLoader::new(subscription.cancel.clone()));
        let task = {
            let this = Arc::downgrade(self);
            let receiver = subscription.receiver;
            tokio::spawn(async move {
                Self::run_page_subscription(this, generation, next_index, receiver, false).await
            })
        };
        if let Some(page) = state.pages.last_mut() {
            page.attach_task(task);
        }
    }

    /// One-shot manual refresh: queries for prompts newer than the first
    /// window's cursor and prepends any not already known, newest first.
    pub async fn check_for_new_prompts(self: &Arc<Self>) {
        tracing::info!("Checking for new prompts");
        let Some(member) = self.member.read().await.clone() else {
            return;
        };
        let generation = self.generation.load(Ordering::SeqCst);
        let before = {
            let state = self.state.read().await;
            state
                .pages
                .first()
                .and_then(|page| page.result.as_ref())
                .and_then(|result| result.first_cursor)
        };

        let fetched = match self
            .services
            .prompts
            .get_sent_prompts(&member, self.check_for_new_limit, before)
            .await
        {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::error!("Error checking for new prompts: {err}");
                return;
            }
        };

        let (notifications, created) = {
            let mut state = self.state.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                // The feed was reset while the query was in flight.
                return;
            }
            for prompt in fetched.iter().rev() {
                let known = state
                    .sent_prompts
                    .iter()
                    .chain(state.fresh_prompts.iter())
                    .any(|existing| existing.prompt_id == prompt.prompt_id);
                if !known {
                    tracing::info!("Found a new prompt: {}", prompt.prompt_id);
                    state.fresh_prompts.insert(0, prompt.clone());
                }
            }
            self.reconfigure(&mut state, &member)
        };

        self.dispatch(notifications).await;
        for entry in created {
            entry.start();
        }
    }

    /// Cancels every subscription and resolver, clears all state, and tells
    /// the delegate to re-read the (now empty) list.
    ///
    /// The generation bump happens first, so a snapshot already in flight
    /// from a superseded window can never land in the cleared state.
    pub async fn reset(&self) {
        tracing::info!("Resetting journal feed, unsubscribing from all data");
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.write().await;
            for page in &state.pages {
                page.cancel();
            }
            state.pages.clear();
            for entry in state.entries_by_prompt_id.values() {
                entry.stop();
            }
            state.entries_by_prompt_id.clear();
            state.ordered_prompt_ids.clear();
            state.sent_prompts.clear();
            state.fresh_prompts.clear();
            state.has_loaded = false;
        }
        if let Ok(tasks) = self.tasks.lock() {
            for task in tasks.iter() {
                task.abort();
            }
        }
        self.dispatch(vec![FeedNotification::DataLoaded]).await;
    }

    // ------------------------------------------------------------------
    // Subscription plumbing
    // ------------------------------------------------------------------

    async fn run_page_subscription(
        this: Weak<Self>,
        generation: u64,
        page_index: usize,
        mut receiver: mpsc::UnboundedReceiver<
            Result<PageResult<SentPrompt>, thistle_core::ThistleError>,
        >,
        is_first_past_page: bool,
    ) {
        while let Some(delivery) = receiver.recv().await {
            let Some(feed) = this.upgrade() else {
                return;
            };
            if feed.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!("Dropping page snapshot from superseded feed generation");
                return;
            }
            match delivery {
                Ok(result) => {
                    feed.apply_page_result(generation, page_index, result, is_first_past_page)
                        .await;
                }
                Err(err) => {
                    // The page stays unfinished; no retry at this layer.
                    tracing::error!("Page subscription error on page {page_index}: {err}");
                }
            }
        }
    }

    async fn apply_page_result(
        self: &Arc<Self>,
        generation: u64,
        page_index: usize,
        result: PageResult<SentPrompt>,
        is_first_past_page: bool,
    ) {
        let Some(member) = self.member.read().await.clone() else {
            tracing::warn!("No member on the data feed, dropping page snapshot");
            return;
        };

        let (notifications, created) = {
            let mut state = self.state.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let Some(page) = state.pages.get_mut(page_index) else {
                return;
            };
            tracing::info!(
                "Got page {page_index} snapshot with {} results",
                result.len()
            );
            page.result = Some(result);

            let mut notifications = Vec::new();
            if is_first_past_page && !state.has_loaded {
                let has_results = state.pages[page_index]
                    .result
                    .as_ref()
                    .map(|result| !result.is_empty())
                    .unwrap_or(false);
                notifications.push(FeedNotification::EmptyState { has_results });
            }

            let (mut merge_notifications, created) = self.reconfigure(&mut state, &member);
            notifications.append(&mut merge_notifications);
            if is_first_past_page {
                state.has_loaded = true;
            }
            (notifications, created)
        };

        self.dispatch(notifications).await;
        for entry in created {
            entry.start();
        }
    }

    async fn run_entry_events(
        this: Weak<Self>,
        generation: u64,
        mut receiver: mpsc::UnboundedReceiver<JournalEntry>,
    ) {
        while let Some(entry) = receiver.recv().await {
            let Some(feed) = this.upgrade() else {
                return;
            };
            if feed.generation.load(Ordering::SeqCst) != generation {
                continue;
            }
            let index = feed.index_of(&entry.prompt_id).await;
            if let Some(delegate) = feed.delegate() {
                delegate.update_entry(entry, index).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Merge and diff
    // ------------------------------------------------------------------

    /// Re-merges all window results into the canonical order and diffs it
    /// against the previous one.
    ///
    /// Flatten order is fresh prompts, then the future window, then past
    /// pages in window order; duplicates keep their first occurrence. Newly
    /// seen ids get a resolver (returned for starting once the state lock is
    /// released). Idempotent: unchanged inputs produce no notifications.
    ///
    /// Insert indexes track resolver creation, not membership in the old
    /// order: an id that left the order and later reappears kept its
    /// resolver, so it re-enters without an insert notification and
    /// surfaces again through `update_entry` with its new position.
    fn reconfigure(
        &self,
        state: &mut FeedState,
        member: &Member,
    ) -> (Vec<FeedNotification>, Vec<Arc<JournalEntryData>>) {
        state.sent_prompts = state.flatten();

        let mut new_order: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut inserted: Vec<usize> = Vec::new();
        let mut created: Vec<Arc<JournalEntryData>> = Vec::new();

        for prompt in &state.sent_prompts {
            if !seen.insert(prompt.prompt_id.clone()) {
                continue;
            }
            if !state.entries_by_prompt_id.contains_key(&prompt.prompt_id) {
                let entry = Arc::new(JournalEntryData::new(
                    prompt.clone(),
                    member.clone(),
                    Arc::clone(&self.services.content),
                    Arc::clone(&self.services.responses),
                    self.entry_events.clone(),
                ));
                state
                    .entries_by_prompt_id
                    .insert(prompt.prompt_id.clone(), Arc::clone(&entry));
                created.push(entry);
                inserted.push(new_order.len());
            }
            new_order.push(prompt.prompt_id.clone());
        }

        let removed = removed_indexes(&state.ordered_prompt_ids, &new_order);
        if !removed.is_empty() {
            tracing::info!("Found {} removed indexes", removed.len());
        }
        state.ordered_prompt_ids = new_order;

        let mut notifications = Vec::new();
        if !removed.is_empty() && !inserted.is_empty() {
            notifications.push(FeedNotification::Batch {
                added: inserted,
                removed,
            });
        } else if !removed.is_empty() {
            notifications.push(FeedNotification::Remove(removed));
        } else if !inserted.is_empty() {
            notifications.push(FeedNotification::Insert(inserted));
        }
        (notifications, created)
    }

    fn delegate(&self) -> Option<Arc<dyn JournalFeedDelegate>> {
        self.delegate.read().ok()?.as_ref()?.upgrade()
    }

    async fn dispatch(&self, notifications: Vec<FeedNotification>) {
        if notifications.is_empty() {
            return;
        }
        let Some(delegate) = self.delegate() else {
            return;
        };
        for notification in notifications {
            match notification {
                FeedNotification::EmptyState { has_results } => {
                    delegate.handle_empty_state(has_results).await;
                }
                FeedNotification::Insert(indexes) => delegate.insert_items(&indexes).await,
                FeedNotification::Remove(indexes) => delegate.remove_items(&indexes).await,
                FeedNotification::Batch { added, removed } => {
                    tracing::info!("Performing batch update");
                    delegate.batch_update(&added, &removed).await;
                }
                FeedNotification::DataLoaded => delegate.data_loaded().await,
            }
        }
    }

    // ------------------------------------------------------------------
    // Read-only snapshots
    // ------------------------------------------------------------------

    /// Number of entries in the canonical order.
    pub async fn count(&self) -> usize {
        self.state.read().await.ordered_prompt_ids.len()
    }

    /// The entry at `index` in the canonical order.
    pub async fn get(&self, index: usize) -> Option<JournalEntry> {
        let data = {
            let state = self.state.read().await;
            let prompt_id = state.ordered_prompt_ids.get(index)?;
            state.entries_by_prompt_id.get(prompt_id).cloned()
        }?;
        Some(data.journal_entry().await)
    }

    /// Current position of a prompt in the canonical order.
    pub async fn index_of(&self, prompt_id: &str) -> Option<usize> {
        let state = self.state.read().await;
        state.ordered_prompt_ids.iter().position(|id| id == prompt_id)
    }

    /// Full entry list in canonical order.
    pub async fn entries(&self) -> Vec<JournalEntry> {
        let resolvers: Vec<Arc<JournalEntryData>> = {
            let state = self.state.read().await;
            state
                .ordered_prompt_ids
                .iter()
                .filter_map(|id| state.entries_by_prompt_id.get(id).cloned())
                .collect()
        };
        let mut entries = Vec::with_capacity(resolvers.len());
        for resolver in resolvers {
            entries.push(resolver.journal_entry().await);
        }
        entries
    }

    /// The canonical prompt id order.
    pub async fn ordered_prompt_ids(&self) -> Vec<String> {
        self.state.read().await.ordered_prompt_ids.clone()
    }

    /// The resolver for a prompt id, if one exists.
    pub async fn entry_resolver(&self, prompt_id: &str) -> Option<Arc<JournalEntryData>> {
        let state = self.state.read().await;
        state.entries_by_prompt_id.get(prompt_id).cloned()
    }

    /// Number of open page windows.
    pub async fn page_count(&self) -> usize {
        self.state.read().await.pages.len()
    }

    /// True while the initial windows or any later page await their first
    /// snapshot.
    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading()
    }

    /// True when the last backward page reported more history behind it.
    pub async fn might_have_more(&self) -> bool {
        let state = self.state.read().await;
        state
            .pages
            .last()
            .and_then(|page| page.result.as_ref())
            .map(|result| result.might_have_more)
            .unwrap_or(false)
    }

    /// True once every resolver has finished both halves of its join.
    pub async fn loading_completed(&self) -> bool {
        let resolvers: Vec<Arc<JournalEntryData>> = {
            let state = self.state.read().await;
            state.entries_by_prompt_id.values().cloned().collect()
        };
        for resolver in resolvers {
            if !resolver.loading_complete().await {
                return false;
            }
        }
        true
    }

    /// All responses across the feed, unordered.
    pub async fn responses(&self) -> Vec<ReflectionResponse> {
        let resolvers: Vec<Arc<JournalEntryData>> = {
            let state = self.state.read().await;
            state.entries_by_prompt_id.values().cloned().collect()
        };
        let mut responses = Vec::new();
        for resolver in resolvers {
            responses.extend(resolver.responses().await);
        }
        responses
    }

    /// Total number of reflections written across the feed.
    pub async fn total_reflections(&self) -> usize {
        self.responses().await.len()
    }

    /// Total time spent reflecting, in milliseconds.
    pub async fn total_reflection_duration_ms(&self) -> u64 {
        self.responses()
            .await
            .iter()
            .filter_map(|response| response.reflection_duration_ms)
            .sum()
    }

    /// The member's current consecutive-day reflection streak.
    pub async fn current_streak(&self) -> usize {
        thistle_core::response::calculate_streak(&self.responses().await)
    }
}

impl Drop for JournalFeedDataSource {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut state) = self.state.try_write() {
            for page in &state.pages {
                page.cancel();
            }
            for entry in state.entries_by_prompt_id.values() {
                entry.stop();
            }
            state.pages.clear();
            state.entries_by_prompt_id.clear();
        }
        if let Ok(tasks) = self.tasks.lock() {
            for task in tasks.iter() {
                task.abort();
            }
        }
    }
}

/// Indexes (into `old`) of ids that are absent from `new`.
fn removed_indexes(old: &[String], new: &[String]) -> Vec<usize> {
    let surviving: HashSet<&str> = new.iter().map(String::as_str).collect();
    old.iter()
        .enumerate()
        .filter(|(_, id)| !surviving.contains(id.as_str()))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    /// Replays a remove-then-insert diff the way a diffable list consumer
    /// would: removals against the old list, insertions into the result.
    fn apply_diff(
        old: &[String],
        new: &[String],
        removed: &[usize],
        inserted: &[usize],
    ) -> Vec<String> {
        let mut list: Vec<String> = old
            .iter()
            .enumerate()
            .filter(|(index, _)| !removed.contains(index))
            .map(|(_, id)| id.clone())
            .collect();
        for &index in inserted {
            list.insert(index, new[index].clone());
        }
        list
    }

    fn inserted_indexes(old: &[String], new: &[String]) -> Vec<usize> {
        let prior: HashSet<&str> = old.iter().map(String::as_str).collect();
        new.iter()
            .enumerate()
            .filter(|(_, id)| !prior.contains(id.as_str()))
            .map(|(index, _)| index)
            .collect()
    }

    #[test]
    fn test_removed_indexes_refer_to_old_list() {
        let old = ids(&["a", "b", "c", "d"]);
        let new = ids(&["a", "d"]);
        assert_eq!(removed_indexes(&old, &new), vec![1, 2]);
    }

    #[test]
    fn test_diff_roundtrip_insert_only() {
        let old = ids(&["b", "c"]);
        let new = ids(&["a", "b", "c", "d"]);
        let removed = removed_indexes(&old, &new);
        let inserted = inserted_indexes(&old, &new);
        assert!(removed.is_empty());
        assert_eq!(apply_diff(&old, &new, &removed, &inserted), new);
    }

    #[test]
    fn test_diff_roundtrip_remove_only() {
        let old = ids(&["a", "b", "c"]);
        let new = ids(&["b"]);
        let removed = removed_indexes(&old, &new);
        let inserted = inserted_indexes(&old, &new);
        assert!(inserted.is_empty());
        assert_eq!(apply_diff(&old, &new, &removed, &inserted), new);
    }

    #[test]
    fn test_diff_roundtrip_batch() {
        let old = ids(&["a", "b", "c"]);
        let new = ids(&["x", "b", "y"]);
        let removed = removed_indexes(&old, &new);
        let inserted = inserted_indexes(&old, &new);
        assert_eq!(removed, vec![0, 2]);
        assert_eq!(inserted, vec![0, 2]);
        assert_eq!(apply_diff(&old, &new, &removed, &inserted), new);
    }

    #[test]
    fn test_diff_identical_lists_is_empty() {
        let order = ids(&["a", "b"]);
        assert!(removed_indexes(&order, &order).is_empty());
        assert!(inserted_indexes(&order, &order).is_empty());
    }
}
