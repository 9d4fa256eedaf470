//! Member domain model.

use serde::{Deserialize, Serialize};

/// An authenticated member of the journaling app.
///
/// The feed engine treats authentication as an external collaborator and only
/// consumes the resolved identity. Two members are the same session owner
/// when their ids match; profile fields may change without triggering a feed
/// rebind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique member identifier
    pub id: String,
    /// Sign-in email address
    pub email: String,
    /// Display name, if the member has set one
    pub display_name: Option<String>,
}

impl Member {
    /// Creates a member with the given id and email.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
        }
    }

    /// Returns true when `other` refers to the same account.
    pub fn same_account(&self, other: &Member) -> bool {
        self.id == other.id
    }
}
