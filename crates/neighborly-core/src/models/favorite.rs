use serde::{Deserialize, Serialize};

use super::{Domain, EntityId, UserId};

/// A user's favorite, recorded independently of whether the entity is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FavoriteMarker {
    pub user_id: UserId,
    pub entity_id: EntityId,
    pub domain: Domain,
}

impl FavoriteMarker {
    pub fn new(user_id: UserId, entity_id: EntityId, domain: Domain) -> Self {
        Self {
            user_id,
            entity_id,
            domain,
        }
    }
}

/// A cached entity annotated with the live favorite overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Favorited<E> {
    #[serde(flatten)]
    pub entity: E,
    #[serde(rename = "isFavorite")]
    pub is_favorite: bool,
}
