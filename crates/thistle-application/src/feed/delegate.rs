//! Delegate contract between the feed aggregator and its owner.

use async_trait::async_trait;
use thistle_core::JournalEntry;

/// Receives ordered-list mutations and entry updates from the feed.
///
/// Index semantics follow diffable-list batch updates: `remove_items`
/// indexes refer to the list *before* the update, `insert_items` indexes to
/// the list *after* it, and `batch_update` applies removals first, then
/// insertions. When neither set is non-empty the aggregator stays silent.
///
/// The aggregator holds its delegate weakly; a dropped owner simply stops
/// receiving notifications.
#[async_trait]
pub trait JournalFeedDelegate: Send + Sync {
    /// A single entry's joined data changed. `index` is its current position
    /// in the canonical order, or `None` if the entry is no longer present.
    async fn update_entry(&self, entry: JournalEntry, index: Option<usize>);

    /// New entries appeared at `indexes` (post-update positions).
    async fn insert_items(&self, indexes: &[usize]);

    /// Entries vanished from `indexes` (pre-update positions).
    async fn remove_items(&self, indexes: &[usize]);

    /// Combined update: apply `removed` to the current list, then `added` to
    /// the result.
    async fn batch_update(&self, added: &[usize], removed: &[usize]);

    /// The feed was reset; re-read the full entry list from the aggregator.
    async fn data_loaded(&self);

    /// The first backward page delivered for the first time; `has_results`
    /// is false when the member has no journal history at all.
    async fn handle_empty_state(&self, has_results: bool);
}
