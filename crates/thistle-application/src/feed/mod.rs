//! The incremental feed synchronization engine.
//!
//! Data flows one direction: backend subscriptions feed [`PageLoader`]s,
//! [`JournalFeedDataSource`] merges and diffs the page windows into one
//! canonical order, and [`JournalEntryData`] joins each prompt with its
//! content and responses before the result reaches the session store.
//!
//! [`PageLoader`]: page_loader::PageLoader
//! [`JournalFeedDataSource`]: data_source::JournalFeedDataSource
//! [`JournalEntryData`]: entry_data::JournalEntryData

pub mod data_source;
pub mod delegate;
pub mod entry_data;
pub mod page_loader;

use std::sync::Arc;

use thistle_core::services::{
    PromptContentService, PromptSubscriptionService, ReflectionResponseService,
};

/// The backend collaborators the feed engine is constructed with.
///
/// Bundled so the aggregator and every resolver it creates share the same
/// injected services.
#[derive(Clone)]
pub struct FeedServices {
    pub prompts: Arc<dyn PromptSubscriptionService>,
    pub content: Arc<dyn PromptContentService>,
    pub responses: Arc<dyn ReflectionResponseService>,
}
