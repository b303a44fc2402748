//! Local persistence for cached entities and favorites.
//!
//! Two partitions exist per domain: the general partition, written only by
//! the reconciler's `replace_all` (plus targeted `upsert`s), and the draft
//! partition holding records the user composed locally. `replace_all` never
//! touches drafts.
//!
//! Writers bump a per-domain version counter after committing, so readers
//! can re-query on change instead of polling.

mod memory;
mod sqlite;

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::watch;

use crate::models::{Domain, Entity, EntityId, FavoriteMarker, UserId};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to (de)serialize cached record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Entity cache for all domains.
///
/// Implementations must make `replace_all` atomic: a concurrent `get_all`
/// observes either the complete previous contents or the complete new ones.
pub trait LocalStore: Send + Sync {
    /// Replace the general partition of `E::DOMAIN` with `entities`, in order.
    fn replace_all<E: Entity>(&self, entities: &[E]) -> Result<(), StoreError>;

    /// Insert or overwrite individual records in the general partition.
    fn upsert<E: Entity>(&self, entities: &[E]) -> Result<(), StoreError>;

    /// Snapshot of the general partition, in stored order.
    fn get_all<E: Entity>(&self) -> Result<Vec<E>, StoreError>;

    fn get<E: Entity>(&self, id: EntityId) -> Result<Option<E>, StoreError>;

    fn save_draft<E: Entity>(&self, draft: &E) -> Result<(), StoreError>;

    fn drafts<E: Entity>(&self) -> Result<Vec<E>, StoreError>;

    /// Returns whether a draft was removed.
    fn delete_draft<E: Entity>(&self, id: EntityId) -> Result<bool, StoreError>;

    /// Version counter bumped after every committed write to `domain`.
    fn subscribe(&self, domain: Domain) -> watch::Receiver<u64>;
}

/// Favorite markers, written by user actions and read by the backfill step.
pub trait FavoriteStore: Send + Sync {
    fn favorite_ids(
        &self,
        user_id: UserId,
        domain: Domain,
    ) -> Result<HashSet<EntityId>, StoreError>;

    fn set_favorite(&self, marker: &FavoriteMarker, favorite: bool) -> Result<(), StoreError>;

    /// Version counter bumped after every favorite change.
    fn subscribe_favorites(&self) -> watch::Receiver<u64>;
}

/// Per-domain change counters shared by the store implementations.
pub(crate) struct ChangeFeed {
    senders: [watch::Sender<u64>; 3],
    favorites: watch::Sender<u64>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        Self {
            senders: std::array::from_fn(|_| watch::channel(0).0),
            favorites: watch::channel(0).0,
        }
    }

    fn index(domain: Domain) -> usize {
        match domain {
            Domain::Ticket => 0,
            Domain::Office => 1,
            Domain::Info => 2,
        }
    }

    pub(crate) fn subscribe(&self, domain: Domain) -> watch::Receiver<u64> {
        self.senders[Self::index(domain)].subscribe()
    }

    pub(crate) fn notify(&self, domain: Domain) {
        self.senders[Self::index(domain)].send_modify(|v| *v += 1);
    }

    pub(crate) fn subscribe_favorites(&self) -> watch::Receiver<u64> {
        self.favorites.subscribe()
    }

    pub(crate) fn notify_favorites(&self) {
        self.favorites.send_modify(|v| *v += 1);
    }
}
