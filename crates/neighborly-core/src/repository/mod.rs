//! Domain repositories: the refresh pipeline plus read-through queries.
//!
//! A `Repository` owns one domain. `refresh` runs
//! decide -> fetch -> backfill -> reconcile -> record, strictly in that
//! order; reads go straight to the local store and never wait on a refresh.
//!
//! At most one refresh runs per repository. A forced refresh supersedes an
//! in-flight non-forced one, which then returns `RepositoryError::Superseded`
//! without touching the cache or the sync state.

mod error;
pub mod info;
pub mod office;
pub mod ticket;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::{RemoteDataSource, RemoteError};
use crate::models::{Entity, EntityId, FavoriteMarker, Favorited, UserId};
use crate::providers::CurrentUserProvider;
use crate::refresh::{fetch_all, reconcile, resolve_missing_favorites, DEFAULT_BACKFILL_CONCURRENCY};
use crate::store::{FavoriteStore, LocalStore};
use crate::sync::{SyncDecision, SyncManager, SyncState};

pub use error::RepositoryError;
pub use info::InfoRepository;
pub use office::OfficeRepository;
pub use ticket::TicketRepository;

/// Where a refresh currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshPhase {
    #[default]
    Idle,
    Fetching,
    Backfilling,
    Reconciling,
    Succeeded,
    Failed(String),
}

impl RefreshPhase {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            RefreshPhase::Fetching | RefreshPhase::Backfilling | RefreshPhase::Reconciling
        )
    }
}

impl fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshPhase::Idle => write!(f, "idle"),
            RefreshPhase::Fetching => write!(f, "fetching"),
            RefreshPhase::Backfilling => write!(f, "backfilling favorites"),
            RefreshPhase::Reconciling => write!(f, "updating cache"),
            RefreshPhase::Succeeded => write!(f, "up to date"),
            RefreshPhase::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Cache was fresh enough; nothing was fetched.
    Skipped,
    /// Cache replaced with `stored` records, `backfilled` of them favorites
    /// the listings did not include.
    Refreshed { stored: usize, backfilled: usize },
}

/// Resets the published phase if a refresh is dropped mid-flight.
struct PhaseReset<'a>(&'a watch::Sender<RefreshPhase>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|phase| {
            if phase.is_running() {
                *phase = RefreshPhase::Idle;
                true
            } else {
                false
            }
        });
    }
}

/// Fires when either the domain's cache or the favorite overlay changes.
pub struct CacheWatcher {
    cache: watch::Receiver<u64>,
    favorites: watch::Receiver<u64>,
}

impl CacheWatcher {
    /// Wait for the next change. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            res = self.cache.changed() => res.is_ok(),
            res = self.favorites.changed() => res.is_ok(),
        }
    }
}

pub struct Repository<E: Entity, S: LocalStore> {
    remote: Arc<dyn RemoteDataSource<E>>,
    store: Arc<S>,
    favorites: Arc<dyn FavoriteStore>,
    users: Arc<dyn CurrentUserProvider>,
    sync: Arc<SyncManager>,
    backfill_concurrency: usize,
    flight: Mutex<()>,
    force_requests: watch::Sender<u64>,
    phase: watch::Sender<RefreshPhase>,
}

impl<E: Entity, S: LocalStore> Repository<E, S> {
    pub fn new(
        remote: Arc<dyn RemoteDataSource<E>>,
        store: Arc<S>,
        favorites: Arc<dyn FavoriteStore>,
        users: Arc<dyn CurrentUserProvider>,
        sync: Arc<SyncManager>,
    ) -> Self {
        Self {
            remote,
            store,
            favorites,
            users,
            sync,
            backfill_concurrency: DEFAULT_BACKFILL_CONCURRENCY,
            flight: Mutex::new(()),
            force_requests: watch::channel(0).0,
            phase: watch::channel(RefreshPhase::Idle).0,
        }
    }

    pub fn with_backfill_concurrency(mut self, concurrency: usize) -> Self {
        self.backfill_concurrency = concurrency.max(1);
        self
    }

    // ===== Refresh =====

    /// Refetch the domain if the staleness policy (or `force`) says so.
    pub async fn refresh(&self, force: bool) -> Result<RefreshOutcome, RepositoryError> {
        let mut supersede = if force {
            self.force_requests.send_modify(|n| *n += 1);
            None
        } else {
            Some(self.force_requests.subscribe())
        };

        let _flight = self.flight.lock().await;

        if let Some(ref rx) = supersede {
            if rx.has_changed().unwrap_or(false) {
                debug!(domain = %E::DOMAIN, "Refresh superseded before it started");
                return Err(RepositoryError::Superseded);
            }
        }

        let _reset = PhaseReset(&self.phase);
        let result = self.run(force, supersede.as_mut()).await;
        match &result {
            Ok(outcome) => {
                debug!(domain = %E::DOMAIN, outcome = ?outcome, "Refresh finished");
                self.phase.send_replace(RefreshPhase::Succeeded);
            }
            Err(RepositoryError::Superseded) => {
                self.phase.send_replace(RefreshPhase::Idle);
            }
            Err(e) => {
                warn!(domain = %E::DOMAIN, error = %e, "Refresh failed");
                self.phase.send_replace(RefreshPhase::Failed(e.to_string()));
            }
        }
        result
    }

    async fn run(
        &self,
        force: bool,
        supersede: Option<&mut watch::Receiver<u64>>,
    ) -> Result<RefreshOutcome, RepositoryError> {
        let decision = self.sync.decide(E::DOMAIN, force);
        if !decision.should_fetch {
            return Ok(RefreshOutcome::Skipped);
        }
        let user_id = self.users.current_user_id();

        let (fetched, backfilled) = match supersede {
            Some(rx) => tokio::select! {
                biased;
                _ = rx.changed() => {
                    info!(domain = %E::DOMAIN, "Refresh superseded by a forced refresh");
                    return Err(RepositoryError::Superseded);
                }
                fetched = self.fetch_and_backfill(&decision, user_id) => fetched?,
            },
            None => self.fetch_and_backfill(&decision, user_id).await?,
        };

        // No await points from here on: a cancelled refresh either never
        // reaches this point or commits and records together.
        self.phase.send_replace(RefreshPhase::Reconciling);
        let entities = reconcile(fetched);
        self.store.replace_all(&entities)?;
        self.sync.record_success(E::DOMAIN, decision.current_location);

        info!(
            domain = %E::DOMAIN,
            stored = entities.len(),
            backfilled,
            "Cache refreshed"
        );
        Ok(RefreshOutcome::Refreshed {
            stored: entities.len(),
            backfilled,
        })
    }

    async fn fetch_and_backfill(
        &self,
        decision: &SyncDecision,
        user_id: Option<UserId>,
    ) -> Result<(Vec<E>, usize), RemoteError> {
        self.phase.send_replace(RefreshPhase::Fetching);
        let aggregation = fetch_all(self.remote.as_ref(), decision, user_id).await?;

        self.phase.send_replace(RefreshPhase::Backfilling);
        let loaded: HashSet<EntityId> = aggregation.entities.iter().map(Entity::id).collect();
        let backfilled = resolve_missing_favorites(
            self.remote.as_ref(),
            self.favorites.as_ref(),
            &loaded,
            aggregation.user_id,
            self.backfill_concurrency,
        )
        .await;

        let count = backfilled.len();
        let mut all = aggregation.entities;
        all.extend(backfilled);
        Ok((all, count))
    }

    /// Fetch one entity and merge it into the cache without touching sync state.
    pub async fn refresh_entity(&self, id: EntityId) -> Result<E, RepositoryError> {
        let entity = self.remote.get_by_id(id).await?;
        self.store.upsert(std::slice::from_ref(&entity))?;
        Ok(entity)
    }

    /// Make the next `refresh(false)` fetch regardless of age or distance.
    pub fn invalidate(&self) {
        self.sync.invalidate(E::DOMAIN);
    }

    pub fn phase(&self) -> watch::Receiver<RefreshPhase> {
        self.phase.subscribe()
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state(E::DOMAIN)
    }

    // ===== Read-through queries =====

    fn favorite_ids(&self) -> Result<HashSet<EntityId>, RepositoryError> {
        match self.users.current_user_id() {
            Some(user_id) => Ok(self.favorites.favorite_ids(user_id, E::DOMAIN)?),
            None => Ok(HashSet::new()),
        }
    }

    fn annotate(entities: Vec<E>, favorites: &HashSet<EntityId>) -> Vec<Favorited<E>> {
        entities
            .into_iter()
            .map(|entity| Favorited {
                is_favorite: favorites.contains(&entity.id()),
                entity,
            })
            .collect()
    }

    /// Cached entities with the current user's favorites marked.
    pub fn entities(&self) -> Result<Vec<Favorited<E>>, RepositoryError> {
        let entities = self.store.get_all::<E>()?;
        let favorites = self.favorite_ids()?;
        Ok(Self::annotate(entities, &favorites))
    }

    pub fn entity(&self, id: EntityId) -> Result<Option<Favorited<E>>, RepositoryError> {
        let Some(entity) = self.store.get::<E>(id)? else {
            return Ok(None);
        };
        let is_favorite = self.favorite_ids()?.contains(&id);
        Ok(Some(Favorited {
            entity,
            is_favorite,
        }))
    }

    /// Only the cached entities the current user marked as favorite.
    pub fn favorites(&self) -> Result<Vec<E>, RepositoryError> {
        let favorites = self.favorite_ids()?;
        Ok(self
            .store
            .get_all::<E>()?
            .into_iter()
            .filter(|e| favorites.contains(&e.id()))
            .collect())
    }

    pub fn set_favorite(&self, id: EntityId, favorite: bool) -> Result<(), RepositoryError> {
        let user_id = self
            .users
            .current_user_id()
            .ok_or(RepositoryError::NotAuthenticated)?;
        self.favorites
            .set_favorite(&FavoriteMarker::new(user_id, id, E::DOMAIN), favorite)?;
        Ok(())
    }

    /// Flip the favorite flag of `id`, returning the new state.
    pub fn toggle_favorite(&self, id: EntityId) -> Result<bool, RepositoryError> {
        let now_favorite = !self.favorite_ids()?.contains(&id);
        self.set_favorite(id, now_favorite)?;
        Ok(now_favorite)
    }

    pub fn watch(&self) -> CacheWatcher {
        CacheWatcher {
            cache: self.store.subscribe(E::DOMAIN),
            favorites: self.favorites.subscribe_favorites(),
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn current_user_id(&self) -> Option<UserId> {
        self.users.current_user_id()
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.sync.now()
    }
}
