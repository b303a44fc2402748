//! Staleness policy: decides when a domain's cache must be refetched.
//!
//! `SyncManager::decide` is pure with respect to sync state; only
//! `record_success` (and `invalidate`) mutate it. State is persisted per
//! feature key so decisions survive restarts.

mod policy;
mod state;

pub use policy::{SyncDecision, SyncManager, SyncPolicy};
pub use state::{SyncState, SyncStateStore};
