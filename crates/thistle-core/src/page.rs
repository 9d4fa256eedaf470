//! Query window snapshots and cursors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque continuation cursor into the time-ordered prompt log.
///
/// Wraps the sort key of a boundary item. Produced by the subscription
/// service inside a `PageResult` and handed back unchanged for "check for
/// new" and "load next page" queries; the feed never inspects the inner
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor(pub DateTime<Utc>);

/// A snapshot of one query window.
///
/// Each subscription callback delivers a complete snapshot that replaces the
/// previous one for that window; there is no incremental patching at this
/// layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// The window's items in window order, or `None` before the first
    /// delivery
    pub results: Option<Vec<T>>,
    /// Cursor to the first (newest) item of this snapshot, used by the
    /// incremental "check for new" query
    pub first_cursor: Option<PageCursor>,
    /// Cursor to the last (oldest) item, used to continue backward with the
    /// next page
    pub last_cursor: Option<PageCursor>,
    /// True when the backing window was truncated by its page size
    pub might_have_more: bool,
}

impl<T> PageResult<T> {
    /// An empty snapshot (a window that has delivered and found nothing).
    pub fn empty() -> Self {
        Self {
            results: Some(Vec::new()),
            first_cursor: None,
            last_cursor: None,
            might_have_more: false,
        }
    }

    /// Number of items in this snapshot.
    pub fn len(&self) -> usize {
        self.results.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// True when the snapshot holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
