//! One live query window and its latest snapshot.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use thistle_core::{PageResult, SentPrompt};

/// Owns exactly one live page subscription and its latest result.
///
/// A loader is created when a window is opened (the initial future/past
/// windows, or "load next page") and lives until the aggregator is reset or
/// torn down; individual pages are never closed early. A page never
/// transitions back from finished to unfinished: snapshots only replace
/// each other.
pub struct PageLoader {
    /// Latest snapshot, absent until the subscription's first delivery
    pub result: Option<PageResult<SentPrompt>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PageLoader {
    /// Creates a loader wrapping the subscription's cancellation token.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            result: None,
            cancel,
            task: None,
        }
    }

    /// True once this window has delivered its first snapshot.
    pub fn finished_loading(&self) -> bool {
        self.result.is_some()
    }

    /// Attaches the drain task so teardown can abort it.
    pub fn attach_task(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    /// Cancels the subscription and stops the drain task.
    pub fn cancel(&self) {
        self.cancel.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl Drop for PageLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_loading_tracks_first_result() {
        let mut loader = PageLoader::new(CancellationToken::new());
        assert!(!loader.finished_loading());
        loader.result = Some(PageResult::empty());
        assert!(loader.finished_loading());
    }
}
