//! Infrastructure layer for Thistle.
//!
//! In-memory implementations of the collaborator service traits. They are
//! the reference implementation of the subscription contracts, the backend
//! for the test suite, and a stand-in for embedding hosts without a live
//! backend.

pub mod memory_content_service;
pub mod memory_prompt_service;
pub mod memory_response_service;

pub use crate::memory_content_service::MemoryContentService;
pub use crate::memory_prompt_service::MemoryPromptService;
pub use crate::memory_response_service::MemoryResponseService;
