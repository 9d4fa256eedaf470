//! Error types for the Thistle feed engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the Thistle client core.
///
/// Subscription and query failures are surfaced through this type but never
/// propagate past the feed layer: the feed logs them and leaves the affected
/// page or join in its "not yet loaded" state.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ThistleError {
    /// Entity not found with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// A live subscription failed to deliver a snapshot
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// A one-shot query failed
    #[error("Query error: {0}")]
    Query(String),

    /// A required precondition (member, session) was missing
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThistleError {
    /// Creates a `NotFound` error for the given entity type and id.
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a `Subscription` error from any displayable cause.
    pub fn subscription(message: impl std::fmt::Display) -> Self {
        Self::Subscription(message.to_string())
    }

    /// Creates a `Query` error from any displayable cause.
    pub fn query(message: impl std::fmt::Display) -> Self {
        Self::Query(message.to_string())
    }
}
