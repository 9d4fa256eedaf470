//! Application layer for Thistle.
//!
//! This crate provides the incremental feed synchronization engine (page
//! loaders, the feed aggregator, and the per-entry join resolver) and the
//! session store that owns one feed per authenticated member.

pub mod feed;
pub mod store;

pub use feed::data_source::JournalFeedDataSource;
pub use feed::delegate::JournalFeedDelegate;
pub use feed::entry_data::JournalEntryData;
pub use feed::page_loader::PageLoader;
pub use feed::FeedServices;
pub use store::session_store::SessionStore;
