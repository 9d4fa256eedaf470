//! Reactive session-scoped state.

pub mod session_store;

pub use session_store::{PendingAction, SessionStore};
