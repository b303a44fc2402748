use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::api::RemoteDataSource;
use crate::models::{Entity, EntityId, UserId};
use crate::store::FavoriteStore;

/// Maximum concurrent per-id lookups during favorite backfill.
/// Favorites missing from the listings are few; 4 keeps the burst polite.
pub const DEFAULT_BACKFILL_CONCURRENCY: usize = 4;

/// Fetch favorites of `user_id` that the listings did not return.
///
/// Best effort: a failed lookup only drops that entity from this cycle, and
/// an unreadable favorite store means nothing to backfill. Results are
/// sorted by id.
pub async fn resolve_missing_favorites<E: Entity>(
    remote: &dyn RemoteDataSource<E>,
    favorites: &dyn FavoriteStore,
    loaded_ids: &HashSet<EntityId>,
    user_id: Option<UserId>,
    concurrency: usize,
) -> Vec<E> {
    let Some(user_id) = user_id else {
        return Vec::new();
    };

    let favorite_ids = match favorites.favorite_ids(user_id, E::DOMAIN) {
        Ok(ids) => ids,
        Err(e) => {
            warn!(domain = %E::DOMAIN, error = %e, "Failed to read favorites, skipping backfill");
            return Vec::new();
        }
    };

    let mut missing: Vec<EntityId> = favorite_ids.difference(loaded_ids).copied().collect();
    if missing.is_empty() {
        return Vec::new();
    }
    missing.sort_unstable();
    debug!(domain = %E::DOMAIN, count = missing.len(), "Backfilling favorites");

    let mut found: Vec<E> = stream::iter(missing)
        .map(|id| async move { (id, remote.get_by_id(id).await) })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|(id, result)| async move {
            match result {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(domain = %E::DOMAIN, id, error = %e, "Favorite backfill failed");
                    None
                }
            }
        })
        .collect()
        .await;

    found.sort_by_key(|e| e.id());
    found
}
