//! In-memory store. Each partition is an immutable snapshot swapped whole.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::models::{Domain, Entity, EntityId, FavoriteMarker, UserId};

use super::{ChangeFeed, FavoriteStore, LocalStore, StoreError};

type Snapshot = Arc<Vec<(EntityId, Value)>>;

pub struct MemoryStore {
    general: RwLock<HashMap<Domain, Snapshot>>,
    drafts: RwLock<HashMap<Domain, Snapshot>>,
    favorites: RwLock<HashSet<FavoriteMarker>>,
    changes: ChangeFeed,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            general: RwLock::new(HashMap::new()),
            drafts: RwLock::new(HashMap::new()),
            favorites: RwLock::new(HashSet::new()),
            changes: ChangeFeed::new(),
        }
    }

    fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
        lock.read().map_err(|_| StoreError::Poisoned)
    }

    fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
        lock.write().map_err(|_| StoreError::Poisoned)
    }

    fn encode<E: Entity>(entities: &[E]) -> Result<Vec<(EntityId, Value)>, StoreError> {
        entities
            .iter()
            .map(|e| {
                serde_json::to_value(e)
                    .map(|value| (e.id(), value))
                    .map_err(StoreError::from)
            })
            .collect()
    }

    fn decode<E: Entity>(snapshot: &[(EntityId, Value)]) -> Result<Vec<E>, StoreError> {
        snapshot
            .iter()
            .map(|(_, value)| <E as Deserialize>::deserialize(value).map_err(StoreError::from))
            .collect()
    }

    fn snapshot(
        lock: &RwLock<HashMap<Domain, Snapshot>>,
        domain: Domain,
    ) -> Result<Snapshot, StoreError> {
        Ok(Self::read(lock)?.get(&domain).cloned().unwrap_or_default())
    }

    /// Overwrite-or-append by id inside one partition.
    fn merge_into(
        lock: &RwLock<HashMap<Domain, Snapshot>>,
        domain: Domain,
        records: Vec<(EntityId, Value)>,
    ) -> Result<(), StoreError> {
        let mut map = Self::write(lock)?;
        let current = map.entry(domain).or_default();
        let rows = Arc::make_mut(current);
        for (id, value) in records {
            match rows.iter_mut().find(|(existing, _)| *existing == id) {
                Some(slot) => slot.1 = value,
                None => rows.push((id, value)),
            }
        }
        Ok(())
    }
}

impl LocalStore for MemoryStore {
    fn replace_all<E: Entity>(&self, entities: &[E]) -> Result<(), StoreError> {
        // Encode before taking the lock so readers are never blocked on serde.
        let fresh: Snapshot = Arc::new(Self::encode(entities)?);
        Self::write(&self.general)?.insert(E::DOMAIN, fresh);
        self.changes.notify(E::DOMAIN);
        Ok(())
    }

    fn upsert<E: Entity>(&self, entities: &[E]) -> Result<(), StoreError> {
        Self::merge_into(&self.general, E::DOMAIN, Self::encode(entities)?)?;
        self.changes.notify(E::DOMAIN);
        Ok(())
    }

    fn get_all<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        let snapshot = Self::snapshot(&self.general, E::DOMAIN)?;
        Self::decode(&snapshot)
    }

    fn get<E: Entity>(&self, id: EntityId) -> Result<Option<E>, StoreError> {
        let snapshot = Self::snapshot(&self.general, E::DOMAIN)?;
        snapshot
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, value)| <E as Deserialize>::deserialize(value).map_err(StoreError::from))
            .transpose()
    }

    fn save_draft<E: Entity>(&self, draft: &E) -> Result<(), StoreError> {
        Self::merge_into(&self.drafts, E::DOMAIN, Self::encode(std::slice::from_ref(draft))?)?;
        self.changes.notify(E::DOMAIN);
        Ok(())
    }

    fn drafts<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        let snapshot = Self::snapshot(&self.drafts, E::DOMAIN)?;
        Self::decode(&snapshot)
    }

    fn delete_draft<E: Entity>(&self, id: EntityId) -> Result<bool, StoreError> {
        let removed = {
            let mut map = Self::write(&self.drafts)?;
            match map.get_mut(&E::DOMAIN) {
                Some(current) => {
                    let rows = Arc::make_mut(current);
                    let before = rows.len();
                    rows.retain(|(existing, _)| *existing != id);
                    rows.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.changes.notify(E::DOMAIN);
        }
        Ok(removed)
    }

    fn subscribe(&self, domain: Domain) -> watch::Receiver<u64> {
        self.changes.subscribe(domain)
    }
}

impl FavoriteStore for MemoryStore {
    fn favorite_ids(
        &self,
        user_id: UserId,
        domain: Domain,
    ) -> Result<HashSet<EntityId>, StoreError> {
        Ok(Self::read(&self.favorites)?
            .iter()
            .filter(|m| m.user_id == user_id && m.domain == domain)
            .map(|m| m.entity_id)
            .collect())
    }

    fn set_favorite(&self, marker: &FavoriteMarker, favorite: bool) -> Result<(), StoreError> {
        let changed = {
            let mut favorites = Self::write(&self.favorites)?;
            if favorite {
                favorites.insert(*marker)
            } else {
                favorites.remove(marker)
            }
        };
        if changed {
            self.changes.notify_favorites();
        }
        Ok(())
    }

    fn subscribe_favorites(&self) -> watch::Receiver<u64> {
        self.changes.subscribe_favorites()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Office, Ticket};
    use crate::testing::{office, ticket};

    #[test]
    fn test_replace_all_swaps_contents() {
        let store = MemoryStore::new();
        store.replace_all(&[ticket(1), ticket(2)]).unwrap();
        store.replace_all(&[ticket(3)]).unwrap();

        let ids: Vec<_> = store.get_all::<Ticket>().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3]);
        assert!(store.get::<Ticket>(1).unwrap().is_none());
    }

    #[test]
    fn test_domains_are_partitioned() {
        let store = MemoryStore::new();
        store.replace_all(&[ticket(1)]).unwrap();
        store.replace_all(&[office(1), office(2)]).unwrap();

        assert_eq!(store.get_all::<Ticket>().unwrap().len(), 1);
        assert_eq!(store.get_all::<Office>().unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_overwrites_by_id() {
        let store = MemoryStore::new();
        store.replace_all(&[ticket(1), ticket(2)]).unwrap();

        let mut changed = ticket(2);
        changed.title = "changed".to_string();
        store.upsert(&[changed, ticket(5)]).unwrap();

        let all = store.get_all::<Ticket>().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].title, "changed");
        assert_eq!(all[2].id, 5);
    }

    #[test]
    fn test_replace_all_leaves_drafts_alone() {
        let store = MemoryStore::new();
        store.save_draft(&ticket(-1)).unwrap();
        store.replace_all(&[ticket(1)]).unwrap();

        assert_eq!(store.drafts::<Ticket>().unwrap().len(), 1);
        assert!(store.delete_draft::<Ticket>(-1).unwrap());
        assert!(!store.delete_draft::<Ticket>(-1).unwrap());
    }

    #[test]
    fn test_writes_bump_change_counter() {
        let store = MemoryStore::new();
        let rx = store.subscribe(Domain::Ticket);
        let other = store.subscribe(Domain::Info);
        store.replace_all(&[ticket(1)]).unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(!other.has_changed().unwrap());
    }

    #[test]
    fn test_favorites_per_user_and_domain() {
        let store = MemoryStore::new();
        let rx = store.subscribe_favorites();
        store.set_favorite(&FavoriteMarker::new(1, 10, Domain::Ticket), true).unwrap();
        store.set_favorite(&FavoriteMarker::new(1, 11, Domain::Office), true).unwrap();
        store.set_favorite(&FavoriteMarker::new(2, 12, Domain::Ticket), true).unwrap();

        let ids = store.favorite_ids(1, Domain::Ticket).unwrap();
        assert_eq!(ids, HashSet::from([10]));
        assert!(rx.has_changed().unwrap());

        store.set_favorite(&FavoriteMarker::new(1, 10, Domain::Ticket), false).unwrap();
        assert!(store.favorite_ids(1, Domain::Ticket).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_reader_never_sees_mixed_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let old: Vec<Ticket> = (0..200).map(ticket).collect();
        let new: Vec<Ticket> = (1000..1200).map(ticket).collect();
        store.replace_all(&old).unwrap();

        let reader_store = Arc::clone(&store);
        let reader = tokio::task::spawn_blocking(move || {
            for _ in 0..500 {
                let snapshot = reader_store.get_all::<Ticket>().unwrap();
                assert_eq!(snapshot.len(), 200);
                let all_old = snapshot.iter().all(|t| t.id < 1000);
                let all_new = snapshot.iter().all(|t| t.id >= 1000);
                assert!(all_old || all_new, "observed a mixed snapshot");
            }
        });

        for i in 0..50 {
            let next = if i % 2 == 0 { &new } else { &old };
            store.replace_all(next).unwrap();
            tokio::task::yield_now().await;
        }
        reader.await.unwrap();
    }
}
