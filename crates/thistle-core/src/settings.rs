//! App settings consumed by the feed engine.

use serde::{Deserialize, Serialize};

/// Remote app configuration, narrowed to what the feed layer reads.
///
/// Owned and refreshed by an external settings collaborator; the session
/// store holds the latest copy and hands the relevant knobs to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Number of prompts fetched per backward page
    pub page_size: usize,
    /// Upper bound for the one-shot "check for new prompts" query
    pub check_for_new_limit: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            page_size: 3,
            check_for_new_limit: 10,
        }
    }
}
